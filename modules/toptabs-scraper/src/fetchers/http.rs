use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, UPGRADE_INSECURE_REQUESTS};
use tracing::{info, warn};

use toptabs_catalog::Fetcher;

use super::USER_AGENT;

/// How much of an error body to keep in logs and error messages.
const BODY_SNIPPET: usize = 300;

/// Plain HTTP fetch with browser-like headers.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        info!(url, fetcher = "http", "Fetching page");

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Request to {url} failed"))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(BODY_SNIPPET).collect();
            warn!(url, fetcher = "http", status = status.as_u16(), body = %snippet, "Non-success response");
            anyhow::bail!("HTTP {status} for {url}: {snippet}");
        }

        let body = resp
            .text()
            .await
            .with_context(|| format!("Failed to read body from {url}"))?;

        info!(url, fetcher = "http", bytes = body.len(), "Fetched successfully");
        Ok(body)
    }

    fn name(&self) -> &str {
        "http"
    }
}
