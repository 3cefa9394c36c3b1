pub mod extract;
pub mod fetchers;

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use toptabs_catalog::{Extractor, FileSnapshotStore, RefreshOptions, Refresher};
use toptabs_common::Config;

pub use extract::EmbeddedJsonExtractor;
pub use fetchers::{BrowserlessFetcher, ChromeFetcher, FetchChain, HttpFetcher, USER_AGENT};

/// Fetch chain for the configured strategies: plain HTTP first, then any
/// enabled rendering fallbacks.
pub fn build_fetch_chain(config: &Config, extractor: Arc<dyn Extractor>) -> Result<FetchChain> {
    let mut chain = FetchChain::new(extractor).then(Arc::new(HttpFetcher::new(config.http_timeout)?));

    if let Some(ref base_url) = config.browserless_url {
        // Rendering waits for the network to go idle, so it gets more headroom than plain HTTP.
        chain = chain.then(Arc::new(BrowserlessFetcher::new(
            base_url,
            config.browserless_token.as_deref(),
            config.http_timeout * 2,
        )?));
    }
    if config.chrome_fallback {
        chain = chain.then(Arc::new(ChromeFetcher::new()));
    }

    info!(fetchers = %chain.describe(), "Fetch chain ready");
    Ok(chain)
}

/// Refresher wired to the file-backed cache and the live site.
pub fn build_refresher(config: &Config) -> Result<Refresher> {
    let extractor: Arc<dyn Extractor> = Arc::new(EmbeddedJsonExtractor);
    let fetcher = build_fetch_chain(config, extractor.clone())?;
    let store = FileSnapshotStore::new(config.cache_path());

    Ok(Refresher::new(
        Arc::new(store),
        Arc::new(fetcher),
        extractor,
        RefreshOptions::from(config),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(pairs: &[(&str, &str)]) -> Config {
        Config::from_lookup(|key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        })
        .unwrap()
    }

    #[test]
    fn chain_defaults_to_plain_http() {
        let chain = build_fetch_chain(&config(&[]), Arc::new(EmbeddedJsonExtractor)).unwrap();
        assert_eq!(chain.describe(), "http");
    }

    #[test]
    fn rendering_fallbacks_follow_config() {
        let config = config(&[
            ("BROWSERLESS_URL", "http://localhost:3000"),
            ("BROWSERLESS_TOKEN", "secret"),
            ("CHROME_FALLBACK", "1"),
        ]);
        let chain = build_fetch_chain(&config, Arc::new(EmbeddedJsonExtractor)).unwrap();
        assert_eq!(chain.describe(), "http -> browserless -> chrome");
    }
}
