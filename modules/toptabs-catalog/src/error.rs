/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Fetch failed for {listing}: {message}")]
    Fetch { listing: String, message: String },

    #[error("Extraction failed for {listing}: {message}")]
    Extraction { listing: String, message: String },

    #[error("Persistence failed: {0}")]
    Persistence(#[from] std::io::Error),

    #[error("Snapshot encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Refresh produced no rows; keeping the previous snapshot")]
    EmptyRefresh,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
