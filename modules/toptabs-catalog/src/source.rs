// Collaborator seams for the refresh orchestrator: where listing payloads come
// from and how they turn into observations.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use toptabs_common::{Listing, Observation};

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the raw payload behind `url`.
    async fn fetch(&self, url: &str) -> Result<String>;
    fn name(&self) -> &str;
}

#[async_trait]
impl<F: Fetcher + ?Sized> Fetcher for Arc<F> {
    async fn fetch(&self, url: &str) -> Result<String> {
        (**self).fetch(url).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// One observation together with the raw id it was extracted under.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingEntry {
    pub raw_id: String,
    pub observation: Observation,
}

/// Everything one listing payload yields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub entries: Vec<ListingEntry>,
    /// Popularity by raw id, published separately from the entries.
    pub hits_by_id: HashMap<String, u64>,
}

impl Extraction {
    /// Observations with popularity filled in from the lookup where missing.
    pub fn into_observations(self) -> Vec<Observation> {
        let Extraction { entries, hits_by_id } = self;
        entries
            .into_iter()
            .map(|entry| {
                let mut obs = entry.observation;
                if obs.hits.is_none() {
                    obs.hits = hits_by_id.get(&entry.raw_id).copied();
                }
                obs
            })
            .collect()
    }
}

pub trait Extractor: Send + Sync {
    /// Turn one listing payload into observations.
    fn extract(&self, listing: &Listing, payload: &str) -> Result<Extraction>;

    /// Cheap check that `payload` carries the structure `extract` reads.
    fn recognizes(&self, payload: &str) -> bool;
}

impl<E: Extractor + ?Sized> Extractor for Arc<E> {
    fn extract(&self, listing: &Listing, payload: &str) -> Result<Extraction> {
        (**self).extract(listing, payload)
    }

    fn recognizes(&self, payload: &str) -> bool {
        (**self).recognizes(payload)
    }
}
