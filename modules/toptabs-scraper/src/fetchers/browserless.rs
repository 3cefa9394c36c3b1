use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use browserless_client::{BrowserlessClient, ContentRequest};
use tracing::{info, warn};

use toptabs_catalog::Fetcher;

use super::USER_AGENT;

/// Rendering fallback through a Browserless instance.
pub struct BrowserlessFetcher {
    client: BrowserlessClient,
}

impl BrowserlessFetcher {
    /// `timeout` covers the whole render, network-idle wait included.
    pub fn new(base_url: &str, token: Option<&str>, timeout: Duration) -> Result<Self> {
        info!(base_url, timeout_secs = timeout.as_secs(), "BrowserlessFetcher initialized");
        Ok(Self {
            client: BrowserlessClient::with_timeout(base_url, token, timeout)
                .context("Failed to build Browserless client")?,
        })
    }
}

#[async_trait]
impl Fetcher for BrowserlessFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        info!(url, fetcher = "browserless", "Fetching page");

        let request = ContentRequest::new(url)
            .wait_for_network_idle()
            .user_agent(USER_AGENT);
        let html = self
            .client
            .render(&request)
            .await
            .context("Browserless content request failed")?;

        if html.is_empty() {
            warn!(url, fetcher = "browserless", "Empty HTML response");
        } else {
            info!(url, fetcher = "browserless", bytes = html.len(), "Fetched successfully");
        }
        Ok(html)
    }

    fn name(&self) -> &str {
        "browserless"
    }
}
