//! Router behavior through `oneshot`, backed by an in-memory store.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{TimeZone, Utc};
use serde_json::Value;
use tower::ServiceExt;

use toptabs_api::{router, AppState};
use toptabs_catalog::{
    Extraction, Extractor, Fetcher, ListingEntry, MemorySnapshotStore, RefreshOptions, Refresher,
    Snapshot, SnapshotStore,
};
use toptabs_common::{tab_url, Category, Listing, Observation, Record, SortOrder};

/// Returns the same payload for every URL, or fails every time.
struct StaticFetcher(Option<&'static str>);

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        match self.0 {
            Some(body) => Ok(body.to_string()),
            None => anyhow::bail!("connection refused: {url}"),
        }
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Each payload line is `id|artist|song|hits`.
struct LineExtractor;

impl Extractor for LineExtractor {
    fn extract(&self, listing: &Listing, payload: &str) -> Result<Extraction> {
        let mut extraction = Extraction::default();
        for line in payload.lines() {
            let parts: Vec<&str> = line.split('|').collect();
            let [id, artist, song, hits] = parts[..] else {
                anyhow::bail!("bad line: {line}");
            };
            let id: u64 = id.parse()?;
            extraction.entries.push(ListingEntry {
                raw_id: id.to_string(),
                observation: Observation::new(tab_url(id), listing.category).named(artist, song),
            });
            extraction.hits_by_id.insert(id.to_string(), hits.parse()?);
        }
        Ok(extraction)
    }

    fn recognizes(&self, _payload: &str) -> bool {
        true
    }
}

const PAYLOAD: &str = "1|Oasis|Wonderwall|900\n2|Eagles|Hotel California|1200";

fn options() -> RefreshOptions {
    RefreshOptions {
        listing_base_url: "https://listings.test".into(),
        categories: vec![Category::Chords],
        orders: vec![SortOrder::Hits],
        fetch_delay: Duration::ZERO,
        ..RefreshOptions::default()
    }
}

fn app_with(store: Arc<MemorySnapshotStore>, payload: Option<&'static str>, static_dir: &Path) -> Router {
    let refresher = Refresher::new(
        store,
        Arc::new(StaticFetcher(payload)),
        Arc::new(LineExtractor),
        options(),
    );
    router(AppState::new(Arc::new(refresher)), static_dir)
}

fn stale_snapshot() -> Snapshot {
    Snapshot::from_scrape(
        Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
        vec![Category::Tab],
        vec![],
        vec![Record {
            artist: "Old".into(),
            song: "Song".into(),
            category: Some(Category::Tab),
            url: tab_url(9),
            hits: 1,
            rating: None,
            votes: None,
        }],
    )
}

async fn send(app: Router, method: &str, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec();
    (status, headers, body)
}

fn json(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap()
}

#[tokio::test]
async fn health_is_ok() {
    let dir = tempfile::tempdir().unwrap();
    let app = app_with(Arc::new(MemorySnapshotStore::new()), None, dir.path());

    let (status, headers, body) = send(app, "GET", "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");
    assert_eq!(headers[header::CACHE_CONTROL], "no-store");
}

#[tokio::test]
async fn data_is_404_before_first_scrape() {
    let dir = tempfile::tempdir().unwrap();
    let app = app_with(Arc::new(MemorySnapshotStore::new()), None, dir.path());

    let (status, _, body) = send(app, "GET", "/data/ug_top.json").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json(&body)["error"], "No cached data yet");
}

#[tokio::test]
async fn data_serves_persisted_bytes_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let raw = br#"{"meta":{"scraped_at":"2024-01-01T00:00:00Z","row_count":0},"rows":[]}"#;
    let store = Arc::new(MemorySnapshotStore::with_raw(raw.to_vec()));
    let app = app_with(store, None, dir.path());

    let (status, headers, body) = send(app, "GET", "/data/ug_top.json").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, raw.to_vec());
    assert!(headers[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("application/json"));
    assert_eq!(headers[header::CACHE_CONTROL], "no-store");
}

#[tokio::test]
async fn scrape_builds_and_persists_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemorySnapshotStore::new());
    let app = app_with(store.clone(), Some(PAYLOAD), dir.path());

    let (status, _, body) = send(app.clone(), "POST", "/scrape").await;
    assert_eq!(status, StatusCode::OK);
    let body = json(&body);
    assert_eq!(body["ok"], true);
    assert_eq!(body["row_count"], 2);
    assert_eq!(body["reused"], false);
    assert_eq!(body["meta"]["types"], serde_json::json!(["chords"]));
    assert_eq!(store.save_count(), 1);

    let (status, _, body) = send(app, "GET", "/data/ug_top.json").await;
    assert_eq!(status, StatusCode::OK);
    let rows = json(&body)["rows"].clone();
    assert_eq!(rows[0]["song"], "Hotel California");
    assert_eq!(rows[0]["hits"], 1200);
    assert_eq!(rows[1]["song"], "Wonderwall");
}

#[tokio::test]
async fn fresh_snapshot_is_reused_unless_forced() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemorySnapshotStore::new());
    let app = app_with(store.clone(), Some(PAYLOAD), dir.path());

    send(app.clone(), "GET", "/scrape").await;
    let (_, _, body) = send(app.clone(), "GET", "/scrape").await;
    assert_eq!(json(&body)["reused"], true);
    assert_eq!(store.save_count(), 1);

    let (_, _, body) = send(app, "GET", "/scrape?force=yes").await;
    assert_eq!(json(&body)["reused"], false);
    assert_eq!(store.save_count(), 2);
}

#[tokio::test]
async fn failed_scrape_reports_500_and_keeps_cache() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemorySnapshotStore::with_snapshot(&stale_snapshot()).unwrap());
    let before = store.read_raw().unwrap();
    let app = app_with(store.clone(), None, dir.path());

    let (status, _, body) = send(app, "GET", "/scrape?force=1").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let body = json(&body);
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"], "Scrape failed");
    assert!(body["details"].as_str().unwrap().contains("connection refused"));

    assert_eq!(store.read_raw().unwrap(), before);
    assert_eq!(store.save_count(), 0);
}

#[tokio::test]
async fn unmatched_paths_fall_back_to_static_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), "<h1>Top tabs</h1>").unwrap();
    let app = app_with(Arc::new(MemorySnapshotStore::new()), None, dir.path());

    let (status, _, body) = send(app.clone(), "GET", "/index.html").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"<h1>Top tabs</h1>");

    let (status, _, _) = send(app, "GET", "/missing.css").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
