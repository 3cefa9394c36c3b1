use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use tracing::{error, info, warn};

use toptabs_common::config::parse_bool;

use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ScrapeQuery {
    force: Option<String>,
}

impl ScrapeQuery {
    /// `1`, `true`, `yes` and `on` force a refresh. Anything else does not.
    fn force(&self) -> bool {
        self.force
            .as_deref()
            .map(|raw| parse_bool(raw).unwrap_or(false))
            .unwrap_or(false)
    }
}

/// Raw bytes of the current snapshot, exactly as persisted.
pub async fn cached_data(State(state): State<Arc<AppState>>) -> Response {
    let store = state.refresher.store();

    match store.read_raw() {
        Ok(Some(bytes)) => (
            [(header::CONTENT_TYPE, "application/json; charset=utf-8")],
            bytes,
        )
            .into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "error": "No cached data yet",
                "details": store.location(),
            })),
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to read cache file");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": "Failed to read cache file",
                    "details": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}

/// Refresh the catalog (or reuse a fresh snapshot) and report its metadata.
pub async fn scrape(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ScrapeQuery>,
) -> Response {
    let force = query.force();
    info!(force, "Scrape requested");

    match state.refresher.refresh(force).await {
        Ok(outcome) => Json(serde_json::json!({
            "ok": true,
            "meta": outcome.snapshot.meta,
            "row_count": outcome.snapshot.meta.row_count,
            "reused": outcome.reused,
        }))
        .into_response(),
        Err(e) => {
            error!(error = %e, "Scrape failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "ok": false,
                    "error": "Scrape failed",
                    "details": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(force: Option<&str>) -> ScrapeQuery {
        ScrapeQuery {
            force: force.map(String::from),
        }
    }

    #[test]
    fn force_accepts_truthy_spellings() {
        for raw in ["1", "true", "YES", "on"] {
            assert!(query(Some(raw)).force(), "{raw} should force");
        }
        for raw in ["0", "false", "", "maybe"] {
            assert!(!query(Some(raw)).force(), "{raw} should not force");
        }
        assert!(!query(None).force());
    }
}
