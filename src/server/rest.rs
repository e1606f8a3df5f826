//! REST API endpoints.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};

use crate::error::VectorStoreError;
use crate::indexing::{IndexState, IndexingOrchestrator, LastRun};
use crate::storage::{Database, VectorStore};
use crate::watcher::{FileWatcher, WatcherStatsSnapshot};
use crate::Error;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub indexing: Arc<IndexingOrchestrator>,
    pub store: Arc<dyn VectorStore>,
    pub database: Database,
    pub watcher: Option<Arc<FileWatcher>>,
    /// Reindexed when a request names no path.
    pub default_root: PathBuf,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: String,
}

/// Body of `POST /api/v1/index`.
#[derive(Debug, Default, Deserialize)]
pub struct IndexRequest {
    pub path: Option<PathBuf>,
}

/// Answer to a reindex request.
#[derive(Debug, Serialize)]
pub struct IndexResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// `GET /api/v1/index/status` body.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub state: IndexState,
    pub last_run: Option<LastRun>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watcher: Option<WatcherStatsSnapshot>,
}

/// Create REST API router.
pub fn create_rest_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/api/v1/index", post(start_index))
        .route("/api/v1/index/status", get(index_status))
        .route("/api/v1/collection/count", get(collection_count))
        .with_state(state)
}

/// Health check endpoint.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let db_status = match state.database.health_check() {
        Ok(()) => "ok",
        Err(e) => {
            tracing::warn!(error = %e, "Database health check failed");
            "error"
        }
    };

    let response = HealthResponse {
        status: if db_status == "ok" {
            "healthy"
        } else {
            "unhealthy"
        }
        .to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: db_status.to_string(),
    };

    let status_code = if db_status == "ok" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(response))
}

/// Prometheus metrics endpoint.
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(axum::http::header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                b"Failed to encode metrics".to_vec(),
            )
        }
    }
}

fn rejected(code: StatusCode, reason: impl Into<String>) -> (StatusCode, Json<IndexResponse>) {
    (
        code,
        Json(IndexResponse {
            status: "rejected",
            path: None,
            reason: Some(reason.into()),
        }),
    )
}

/// Start a full reindex. The body is optional.
async fn start_index(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        IndexRequest::default()
    } else {
        match serde_json::from_slice::<IndexRequest>(&body) {
            Ok(request) => request,
            Err(e) => return rejected(StatusCode::BAD_REQUEST, format!("invalid body: {e}")),
        }
    };
    let path = request.path.unwrap_or_else(|| state.default_root.clone());
    if !path.is_dir() {
        return rejected(
            StatusCode::BAD_REQUEST,
            format!("not a directory: {}", path.display()),
        );
    }

    match state.indexing.start(path.clone()) {
        Ok(_run) => {
            tracing::info!(path = %path.display(), "Full reindex accepted");
            if let Some(watcher) = state.watcher.clone() {
                retarget_watcher(watcher, path.clone());
            }
            (
                StatusCode::ACCEPTED,
                Json(IndexResponse {
                    status: "accepted",
                    path: Some(path.display().to_string()),
                    reason: None,
                }),
            )
        }
        Err(e) if e.is_already_in_progress() => {
            tracing::info!(path = %path.display(), "Full reindex rejected: already running");
            rejected(StatusCode::CONFLICT, "already running")
        }
        Err(e) => rejected(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// Point the watcher at a newly indexed root.
fn retarget_watcher(watcher: Arc<FileWatcher>, path: PathBuf) {
    let same_root = match (watcher.root().canonicalize(), path.canonicalize()) {
        (Ok(current), Ok(requested)) => current == requested,
        _ => watcher.root() == path,
    };
    if same_root {
        return;
    }
    tokio::task::spawn_blocking(move || {
        if let Err(e) = watcher.restart_at(&path) {
            tracing::error!(path = %path.display(), error = %e, "Failed to move watcher");
        }
    });
}

/// Reindex state and the last run's outcome.
async fn index_status(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.indexing.status();
    Json(StatusResponse {
        state: status.state,
        last_run: status.last_run,
        watcher: state.watcher.as_ref().map(|w| w.stats()),
    })
}

/// Number of entries in the configured collection.
async fn collection_count(State(state): State<AppState>) -> impl IntoResponse {
    let collection = state.indexing.collection().to_string();
    match state.store.count(&collection).await {
        Ok(count) => (
            StatusCode::OK,
            Json(serde_json::json!({ "collection": collection, "count": count })),
        ),
        Err(Error::VectorStore(VectorStoreError::CollectionNotFound(_))) => (
            StatusCode::OK,
            Json(serde_json::json!({ "collection": collection, "count": 0 })),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to count entries");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
        }
    }
}
