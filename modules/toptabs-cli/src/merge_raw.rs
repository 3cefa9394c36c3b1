// Offline merge of previously scraped row dumps into one snapshot.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use toptabs_catalog::{reconcile_records, FileSnapshotStore, Snapshot, SnapshotStore};
use toptabs_common::{Category, Record};

#[derive(Debug)]
pub struct MergeReport {
    pub out: PathBuf,
    pub rows: usize,
    pub files: usize,
}

/// Every `*.json` file directly under `raw_dir`, sorted by name.
fn raw_files(raw_dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(raw_dir)
        .with_context(|| format!("Failed to read raw directory {}", raw_dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// One row as found in a raw dump. Every field may be missing or null.
#[derive(Debug, Default, Deserialize)]
struct RawRow {
    artist: Option<String>,
    song: Option<String>,
    #[serde(rename = "type")]
    category: Option<String>,
    url: Option<String>,
    hits: Option<Value>,
    rating: Option<f64>,
    votes: Option<u64>,
}

impl RawRow {
    /// `None` for rows without a url, or with a type this catalog does not know.
    fn into_record(self) -> Option<Record> {
        let url = self.url.filter(|u| !u.is_empty())?;

        let category = match self.category.as_deref().filter(|t| !t.is_empty()) {
            None => None,
            Some(raw) => match raw.parse::<Category>() {
                Ok(category) => Some(category),
                Err(_) => {
                    warn!(url = url.as_str(), kind = raw, "Unknown type in raw row, dropped");
                    return None;
                }
            },
        };

        let hits = self
            .hits
            .and_then(|v| v.as_u64().or_else(|| v.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)))
            .unwrap_or(0);

        Some(Record {
            artist: self.artist.unwrap_or_default(),
            song: self.song.unwrap_or_default(),
            category,
            url,
            hits,
            rating: self.rating,
            votes: self.votes,
        })
    }
}

fn load_rows(path: &Path) -> Result<Vec<Record>> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let value: Value = serde_json::from_slice(&bytes)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    if !value.is_array() {
        anyhow::bail!("{} is not a JSON array", file_name(path));
    }
    let raw: Vec<RawRow> = serde_json::from_value(value)
        .with_context(|| format!("{} has malformed rows", path.display()))?;

    let total = raw.len();
    let rows: Vec<Record> = raw.into_iter().filter_map(RawRow::into_record).collect();
    if rows.len() < total {
        debug!(file = %path.display(), dropped = total - rows.len(), "Skipped rows without a usable url");
    }
    Ok(rows)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Merge every raw dump in `raw_dir` (higher hits wins per url) and write the
/// result to `out` atomically.
pub fn merge_raw(raw_dir: &Path, out: &Path) -> Result<MergeReport> {
    let files = raw_files(raw_dir)?;
    if files.is_empty() {
        anyhow::bail!("No JSON files found in {}", raw_dir.display());
    }

    let mut all_rows = Vec::new();
    for path in &files {
        let rows = load_rows(path)?;
        debug!(file = %path.display(), rows = rows.len(), "Loaded raw rows");
        all_rows.extend(rows);
    }

    let rows = reconcile_records(all_rows).into_sorted();
    let source_files = files.iter().map(|p| file_name(p)).collect();
    let snapshot = Snapshot::from_files(Utc::now(), source_files, rows);

    FileSnapshotStore::new(out).save(&snapshot)?;
    info!(out = %out.display(), rows = snapshot.meta.row_count, files = files.len(), "Raw rows merged");

    Ok(MergeReport {
        out: out.to_path_buf(),
        rows: snapshot.meta.row_count,
        files: files.len(),
    })
}
