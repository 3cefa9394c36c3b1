// Snapshot store: the persisted catalog plus generation metadata.
//
// The file-backed store never writes the canonical path directly. Every save
// goes to a temporary file in the same directory which is synced and then
// renamed over the target, so readers only ever see a complete snapshot.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use toptabs_common::{Category, Record};

use crate::error::{CatalogError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub scraped_at: DateTime<Utc>,
    /// Categories scraped, for a live refresh.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<Category>,
    /// Listing URLs consulted, for a live refresh.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub listings: Vec<String>,
    /// Input file names, for a raw-file merge.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_files: Vec<String>,
    pub row_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub meta: SnapshotMeta,
    pub rows: Vec<Record>,
}

impl Snapshot {
    pub fn from_scrape(
        scraped_at: DateTime<Utc>,
        types: Vec<Category>,
        listings: Vec<String>,
        rows: Vec<Record>,
    ) -> Self {
        Self {
            meta: SnapshotMeta {
                scraped_at,
                types,
                listings,
                source_files: Vec::new(),
                row_count: rows.len(),
            },
            rows,
        }
    }

    pub fn from_files(scraped_at: DateTime<Utc>, source_files: Vec<String>, rows: Vec<Record>) -> Self {
        Self {
            meta: SnapshotMeta {
                scraped_at,
                types: Vec::new(),
                listings: Vec::new(),
                source_files,
                row_count: rows.len(),
            },
            rows,
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

/// Only the metadata block; rows are ignored when checking freshness.
#[derive(Deserialize)]
struct MetaEnvelope {
    meta: SnapshotMeta,
}

/// Parse the generation timestamp out of a persisted snapshot.
pub fn parse_scraped_at(bytes: &[u8]) -> Option<DateTime<Utc>> {
    serde_json::from_slice::<MetaEnvelope>(bytes)
        .ok()
        .map(|env| env.meta.scraped_at)
}

/// `true` when `now - scraped_at` is at most `max_age_hours`.
pub fn within_max_age(scraped_at: DateTime<Utc>, max_age_hours: f64, now: DateTime<Utc>) -> bool {
    let age_hours = (now - scraped_at).num_milliseconds() as f64 / 3_600_000.0;
    age_hours <= max_age_hours
}

pub trait SnapshotStore: Send + Sync {
    /// Parsed snapshot, or `None` if nothing has been persisted yet.
    fn load(&self) -> Result<Option<Snapshot>>;

    /// Replace the persisted snapshot atomically.
    fn save(&self, snapshot: &Snapshot) -> Result<()>;

    /// Persisted bytes exactly as written, for serving.
    fn read_raw(&self) -> Result<Option<Vec<u8>>>;

    /// Human-readable location, for logs and error details.
    fn location(&self) -> String;

    /// Generation timestamp, `None` if missing or unreadable.
    fn scraped_at(&self) -> Option<DateTime<Utc>> {
        match self.read_raw() {
            Ok(Some(bytes)) => parse_scraped_at(&bytes),
            Ok(None) => None,
            Err(e) => {
                debug!(location = self.location(), error = %e, "Snapshot unreadable");
                None
            }
        }
    }

    fn is_fresh_at(&self, max_age_hours: f64, now: DateTime<Utc>) -> bool {
        self.scraped_at()
            .is_some_and(|ts| within_max_age(ts, max_age_hours, now))
    }

    fn is_fresh(&self, max_age_hours: f64) -> bool {
        self.is_fresh_at(max_age_hours, Utc::now())
    }
}

// ---------------------------------------------------------------------------
// FileSnapshotStore (production)
// ---------------------------------------------------------------------------

pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load(&self) -> Result<Option<Snapshot>> {
        match self.read_raw()? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let bytes = snapshot.to_json()?;
        write_atomic(&self.path, |w| w.write_all(&bytes))?;
        info!(
            path = %self.path.display(),
            rows = snapshot.meta.row_count,
            bytes = bytes.len(),
            "Snapshot saved"
        );
        Ok(())
    }

    fn read_raw(&self) -> Result<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CatalogError::Persistence(e)),
        }
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// Write `path` through a temporary sibling file and an atomic rename.
///
/// If `write` fails, the temporary file is removed and `path` is untouched.
pub fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> io::Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".snapshot-")
        .suffix(".tmp")
        .tempfile_in(dir)?;

    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        write(&mut writer)?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| CatalogError::Persistence(e.error))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// MemorySnapshotStore (tests, no filesystem required)
// ---------------------------------------------------------------------------

/// In-memory store holding serialized bytes, with a switch to make saves fail.
#[derive(Default)]
pub struct MemorySnapshotStore {
    bytes: Mutex<Option<Vec<u8>>>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: &Snapshot) -> Result<Self> {
        let store = Self::new();
        *store.lock() = Some(snapshot.to_json()?);
        Ok(store)
    }

    pub fn with_raw(bytes: impl Into<Vec<u8>>) -> Self {
        let store = Self::new();
        *store.lock() = Some(bytes.into());
        store
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Vec<u8>>> {
        self.bytes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self) -> Result<Option<Snapshot>> {
        match self.lock().as_deref() {
            Some(bytes) => Ok(Some(serde_json::from_slice(bytes)?)),
            None => Ok(None),
        }
    }

    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(CatalogError::Persistence(io::Error::other(
                "simulated write failure",
            )));
        }
        let bytes = snapshot.to_json()?;
        *self.lock() = Some(bytes);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn read_raw(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.lock().clone())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
