// Refresh orchestration: reuse a fresh snapshot, or fetch every configured
// listing one at a time, merge, and commit a new snapshot.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use toptabs_common::{Category, Config, Listing, Observation, SortOrder, DEFAULT_LISTING_BASE_URL};

use crate::error::{CatalogError, Result};
use crate::merge::{Catalog, MergeStats};
use crate::snapshot::{Snapshot, SnapshotStore};
use crate::source::{Extractor, Fetcher};

/// What to do when one listing fails to fetch or extract.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop the run; the previous snapshot stays in place.
    #[default]
    Abort,
    /// Log the listing and continue with the rest.
    Skip,
}

#[derive(Debug, Clone)]
pub struct RefreshOptions {
    pub listing_base_url: String,
    pub categories: Vec<Category>,
    pub orders: Vec<SortOrder>,
    pub max_age_hours: f64,
    /// Pause between consecutive fetches.
    pub fetch_delay: Duration,
    pub failure_policy: FailurePolicy,
    /// Seed the merge with the rows of the previous snapshot.
    pub carry_forward: bool,
}

impl Default for RefreshOptions {
    fn default() -> Self {
        Self {
            listing_base_url: DEFAULT_LISTING_BASE_URL.to_string(),
            categories: Category::ALL.to_vec(),
            orders: SortOrder::ALL.to_vec(),
            max_age_hours: 24.0,
            fetch_delay: Duration::from_millis(800),
            failure_policy: FailurePolicy::Abort,
            carry_forward: false,
        }
    }
}

impl From<&Config> for RefreshOptions {
    fn from(config: &Config) -> Self {
        Self {
            listing_base_url: config.listing_base_url.clone(),
            categories: config.categories.clone(),
            orders: config.orders.clone(),
            max_age_hours: config.max_age_hours,
            fetch_delay: config.fetch_delay,
            failure_policy: if config.skip_failed_listings {
                FailurePolicy::Skip
            } else {
                FailurePolicy::Abort
            },
            carry_forward: config.carry_forward,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub snapshot: Snapshot,
    /// `true` when a fresh snapshot was returned without fetching.
    pub reused: bool,
    pub stats: MergeStats,
    /// Listings skipped under `FailurePolicy::Skip`.
    pub failed_listings: Vec<String>,
}

pub struct Refresher {
    store: Arc<dyn SnapshotStore>,
    fetcher: Arc<dyn Fetcher>,
    extractor: Arc<dyn Extractor>,
    options: RefreshOptions,
    /// At most one refresh in flight; readers of the store never take it.
    running: Mutex<()>,
}

impl Refresher {
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        fetcher: Arc<dyn Fetcher>,
        extractor: Arc<dyn Extractor>,
        options: RefreshOptions,
    ) -> Self {
        Self {
            store,
            fetcher,
            extractor,
            options,
            running: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<dyn SnapshotStore> {
        &self.store
    }

    pub fn options(&self) -> &RefreshOptions {
        &self.options
    }

    pub fn is_running(&self) -> bool {
        self.running.try_lock().is_err()
    }

    /// Every listing a full run visits, category-major.
    pub fn listings(&self) -> Vec<Listing> {
        self.options
            .categories
            .iter()
            .flat_map(|&category| {
                self.options
                    .orders
                    .iter()
                    .map(move |&order| Listing::new(&self.options.listing_base_url, category, order))
            })
            .collect()
    }

    /// Return the current snapshot if fresh (and not forced), otherwise rebuild it.
    ///
    /// Concurrent callers queue behind the running refresh. A queued non-forced
    /// caller re-checks freshness once it gets its turn.
    pub async fn refresh(&self, force: bool) -> Result<RefreshOutcome> {
        let _running = self.running.lock().await;

        if !force && self.store.is_fresh(self.options.max_age_hours) {
            match self.store.load() {
                Ok(Some(snapshot)) => {
                    info!(
                        scraped_at = %snapshot.meta.scraped_at,
                        rows = snapshot.meta.row_count,
                        "Snapshot is fresh, skipping refresh"
                    );
                    return Ok(RefreshOutcome {
                        snapshot,
                        reused: true,
                        stats: MergeStats::default(),
                        failed_listings: Vec::new(),
                    });
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Fresh snapshot failed to load, rebuilding"),
            }
        }

        self.rebuild().await
    }

    async fn rebuild(&self) -> Result<RefreshOutcome> {
        let mut catalog = self.seed();
        let listings = self.listings();
        let total = listings.len();

        info!(listings = total, policy = ?self.options.failure_policy, "Refresh starting");

        let mut stats = MergeStats::default();
        let mut consulted = Vec::with_capacity(total);
        let mut failed = Vec::new();

        for (i, listing) in listings.iter().enumerate() {
            if i > 0 && !self.options.fetch_delay.is_zero() {
                tokio::time::sleep(self.options.fetch_delay).await;
            }

            info!(
                category = %listing.category,
                order = %listing.order,
                progress = %format!("{}/{}", i + 1, total),
                "Fetching listing"
            );

            match self.collect(listing).await {
                Ok(observations) => {
                    let merged = catalog.merge(observations);
                    debug!(listing = %listing, %merged, records = catalog.len(), "Listing merged");
                    stats.absorb(merged);
                    consulted.push(listing.url.clone());
                }
                Err(e) => match self.options.failure_policy {
                    FailurePolicy::Abort => {
                        warn!(listing = %listing, error = %e, "Refresh aborted, previous snapshot kept");
                        return Err(e);
                    }
                    FailurePolicy::Skip => {
                        warn!(listing = %listing, error = %e, "Listing failed, skipping");
                        failed.push(listing.url.clone());
                    }
                },
            }
        }

        if catalog.is_empty() {
            warn!(failed = failed.len(), "Refresh produced no rows, previous snapshot kept");
            return Err(CatalogError::EmptyRefresh);
        }

        let mut types = Vec::new();
        for category in &self.options.categories {
            if !types.contains(category) {
                types.push(*category);
            }
        }

        let snapshot = Snapshot::from_scrape(Utc::now(), types, consulted, catalog.into_sorted());
        self.store.save(&snapshot)?;

        info!(
            rows = snapshot.meta.row_count,
            %stats,
            failed = failed.len(),
            "Refresh complete"
        );

        Ok(RefreshOutcome {
            snapshot,
            reused: false,
            stats,
            failed_listings: failed,
        })
    }

    fn seed(&self) -> Catalog {
        if !self.options.carry_forward {
            return Catalog::new();
        }
        match self.store.load() {
            Ok(Some(previous)) => {
                info!(rows = previous.rows.len(), "Seeding merge from previous snapshot");
                Catalog::from_records(previous.rows)
            }
            Ok(None) => Catalog::new(),
            Err(e) => {
                warn!(error = %e, "Previous snapshot unreadable, starting empty");
                Catalog::new()
            }
        }
    }

    async fn collect(&self, listing: &Listing) -> Result<Vec<Observation>> {
        let payload = self
            .fetcher
            .fetch(&listing.url)
            .await
            .map_err(|e| CatalogError::Fetch {
                listing: listing.url.clone(),
                message: format!("{e:#}"),
            })?;

        let extraction = self
            .extractor
            .extract(listing, &payload)
            .map_err(|e| CatalogError::Extraction {
                listing: listing.url.clone(),
                message: format!("{e:#}"),
            })?;

        debug!(
            listing = %listing,
            fetcher = self.fetcher.name(),
            bytes = payload.len(),
            entries = extraction.entries.len(),
            "Listing extracted"
        );

        Ok(extraction.into_observations())
    }
}
