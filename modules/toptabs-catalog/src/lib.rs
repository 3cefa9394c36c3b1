pub mod error;
pub mod merge;
pub mod refresh;
pub mod snapshot;
pub mod source;

pub use error::{CatalogError, Result};
pub use merge::{reconcile_records, sort_records, Catalog, MergeStats};
pub use refresh::{FailurePolicy, RefreshOptions, RefreshOutcome, Refresher};
pub use snapshot::{
    write_atomic, FileSnapshotStore, MemorySnapshotStore, Snapshot, SnapshotMeta, SnapshotStore,
};
pub use source::{Extraction, Extractor, Fetcher, ListingEntry};
