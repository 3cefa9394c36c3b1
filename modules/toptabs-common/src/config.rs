use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::types::{Category, SortOrder, DEFAULT_LISTING_BASE_URL};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Storage
    pub data_dir: PathBuf,
    pub cache_file: String,
    pub max_age_hours: f64,

    // Scraping
    pub listing_base_url: String,
    pub categories: Vec<Category>,
    pub orders: Vec<SortOrder>,
    pub fetch_delay: Duration,
    pub http_timeout: Duration,
    pub skip_failed_listings: bool,
    pub carry_forward: bool,

    // Rendering fallbacks
    pub browserless_url: Option<String>,
    pub browserless_token: Option<String>,
    pub chrome_fallback: bool,

    // Web server
    pub web_host: String,
    pub web_port: u16,
    pub static_dir: PathBuf,
}

impl Config {
    /// Load configuration from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env");
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            data_dir: PathBuf::from(var("TOPTABS_DATA_DIR").unwrap_or_else(|| "data".into())),
            cache_file: var("TOPTABS_CACHE_FILE").unwrap_or_else(|| "ug_top.json".into()),
            max_age_hours: parse_max_age(&var, "TOPTABS_MAX_AGE_HOURS", 24.0)?,
            listing_base_url: var("UG_BASE_URL")
                .unwrap_or_else(|| DEFAULT_LISTING_BASE_URL.to_string()),
            categories: parse_list(&var, "TOPTABS_CATEGORIES", &Category::ALL)?,
            orders: parse_list(&var, "TOPTABS_SORT_ORDERS", &SortOrder::ALL)?,
            fetch_delay: Duration::from_millis(parse_or(&var, "TOPTABS_FETCH_DELAY_MS", 800)?),
            http_timeout: Duration::from_secs(parse_or(&var, "TOPTABS_HTTP_TIMEOUT_SECS", 25)?),
            skip_failed_listings: parse_flag(&var, "TOPTABS_SKIP_FAILED_LISTINGS")?,
            carry_forward: parse_flag(&var, "TOPTABS_CARRY_FORWARD")?,
            browserless_url: var("BROWSERLESS_URL"),
            browserless_token: var("BROWSERLESS_TOKEN"),
            chrome_fallback: parse_flag(&var, "CHROME_FALLBACK")?,
            web_host: var("WEB_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            web_port: parse_or(&var, "PORT", 5177)?,
            static_dir: PathBuf::from(var("STATIC_DIR").unwrap_or_else(|| ".".into())),
        })
    }

    pub fn cache_path(&self) -> PathBuf {
        self.data_dir.join(&self.cache_file)
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.data_dir.join("raw")
    }
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw}")),
        None => Ok(default),
    }
}

/// Freshness window in hours. Must be a finite, non-negative number.
fn parse_max_age<F>(var: &F, key: &str, default: f64) -> Result<f64>
where
    F: Fn(&str) -> Option<String>,
{
    let hours: f64 = parse_or(var, key, default)?;
    if !hours.is_finite() || hours < 0.0 {
        anyhow::bail!("{key} must be a finite, non-negative number of hours, got {hours}");
    }
    Ok(hours)
}

fn parse_flag<F>(var: &F, key: &str) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => parse_bool(&raw).with_context(|| format!("{key} must be a boolean, got {raw}")),
        None => Ok(false),
    }
}

fn parse_list<T, F>(var: &F, key: &str, default: &[T]) -> Result<Vec<T>>
where
    T: FromStr<Err = anyhow::Error> + Clone,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = var(key) else {
        return Ok(default.to_vec());
    };
    let items = raw
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(T::from_str)
        .collect::<Result<Vec<_>>>()
        .with_context(|| format!("{key} has an invalid value: {raw}"))?;
    if items.is_empty() {
        anyhow::bail!("{key} must list at least one value");
    }
    Ok(items)
}

/// Accepts the usual truthy/falsy spellings (`1`, `true`, `yes`, `on`, ...).
pub fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => anyhow::bail!("not a boolean: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_cover_every_listing() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.cache_path(), PathBuf::from("data/ug_top.json"));
        assert_eq!(config.max_age_hours, 24.0);
        assert_eq!(config.categories.len(), 5);
        assert_eq!(config.orders, vec![SortOrder::Hits, SortOrder::Rating]);
        assert_eq!(config.fetch_delay, Duration::from_millis(800));
        assert_eq!(config.web_port, 5177);
        assert!(!config.skip_failed_listings);
        assert!(config.browserless_url.is_none());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = config_from(&[
            ("TOPTABS_DATA_DIR", "/tmp/tabs"),
            ("TOPTABS_MAX_AGE_HOURS", "1.5"),
            ("TOPTABS_CATEGORIES", "tab, bass"),
            ("TOPTABS_FETCH_DELAY_MS", "0"),
            ("TOPTABS_SKIP_FAILED_LISTINGS", "yes"),
            ("BROWSERLESS_URL", "http://localhost:3000"),
        ])
        .unwrap();
        assert_eq!(config.cache_path(), PathBuf::from("/tmp/tabs/ug_top.json"));
        assert_eq!(config.max_age_hours, 1.5);
        assert_eq!(config.categories, vec![Category::Tab, Category::Bass]);
        assert_eq!(config.fetch_delay, Duration::ZERO);
        assert!(config.skip_failed_listings);
        assert_eq!(config.browserless_url.as_deref(), Some("http://localhost:3000"));
    }

    #[test]
    fn invalid_values_are_errors() {
        assert!(config_from(&[("PORT", "http")]).is_err());
        assert!(config_from(&[("CHROME_FALLBACK", "maybe")]).is_err());
        assert!(config_from(&[("TOPTABS_CATEGORIES", "banjo")]).is_err());
    }

    #[test]
    fn max_age_must_be_finite_and_non_negative() {
        for raw in ["NaN", "inf", "-inf", "-1"] {
            assert!(
                config_from(&[("TOPTABS_MAX_AGE_HOURS", raw)]).is_err(),
                "{raw} should be rejected"
            );
        }
        let config = config_from(&[("TOPTABS_MAX_AGE_HOURS", "0")]).unwrap();
        assert_eq!(config.max_age_hours, 0.0);
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = config_from(&[("WEB_HOST", "  ")]).unwrap();
        assert_eq!(config.web_host, "127.0.0.1");
    }
}
