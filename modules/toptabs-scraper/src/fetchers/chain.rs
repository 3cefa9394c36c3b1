use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use toptabs_catalog::{Extractor, Fetcher};

/// Ordered fetch strategies. Each one is tried until a payload carries the
/// structure the extractor reads.
///
/// When no strategy yields a recognized payload, the first payload that came
/// back is returned so the extractor can report what it saw. Errors only
/// surface when every strategy failed.
pub struct FetchChain {
    extractor: Arc<dyn Extractor>,
    fetchers: Vec<Arc<dyn Fetcher>>,
}

impl FetchChain {
    pub fn new(extractor: Arc<dyn Extractor>) -> Self {
        Self {
            extractor,
            fetchers: Vec::new(),
        }
    }

    pub fn then(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetchers.push(fetcher);
        self
    }

    pub fn len(&self) -> usize {
        self.fetchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fetchers.is_empty()
    }

    /// Fetcher names in try order, e.g. `http -> chrome`.
    pub fn describe(&self) -> String {
        self.fetchers
            .iter()
            .map(|f| f.name())
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

#[async_trait]
impl Fetcher for FetchChain {
    async fn fetch(&self, url: &str) -> Result<String> {
        let mut first_payload: Option<String> = None;
        let mut last_error: Option<anyhow::Error> = None;

        for fetcher in &self.fetchers {
            match fetcher.fetch(url).await {
                Ok(payload) if self.extractor.recognizes(&payload) => {
                    if first_payload.is_some() || last_error.is_some() {
                        info!(url, fetcher = fetcher.name(), "Fallback fetcher succeeded");
                    }
                    return Ok(payload);
                }
                Ok(payload) => {
                    warn!(
                        url,
                        fetcher = fetcher.name(),
                        bytes = payload.len(),
                        "Payload missing embedded data, trying next fetcher"
                    );
                    first_payload.get_or_insert(payload);
                }
                Err(e) => {
                    warn!(url, fetcher = fetcher.name(), error = %e, "Fetcher failed, trying next");
                    last_error = Some(e);
                }
            }
        }

        match (first_payload, last_error) {
            (Some(payload), _) => Ok(payload),
            (None, Some(e)) => Err(e),
            (None, None) => anyhow::bail!("No fetchers configured"),
        }
    }

    fn name(&self) -> &str {
        "chain"
    }
}
