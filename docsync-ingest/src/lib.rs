//! docsync-ingest library interface
//!
//! Accepts MongoDB-export JSON uploads over HTTP and reconciles them into the
//! document store by `_id`. Exposes the pipeline and router for integration
//! testing.

pub mod api;
pub mod db;
pub mod document;
pub mod error;
pub mod ingest;
pub mod normalize;
pub mod reconcile;
pub mod utils;

pub use crate::error::{ApiError, ApiResult, ImportError, ImportFailure};
pub use crate::ingest::ingest_json;
pub use crate::reconcile::{ImportReport, Reconciler, UpsertOutcome};

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::db::SqliteDocumentStore;

/// Upload handling settings fixed at startup
#[derive(Debug, Clone)]
pub struct UploadSettings {
    /// Collection records are reconciled into
    pub collection: String,
    /// Directory uploads are staged in before parsing
    pub upload_dir: PathBuf,
    /// Request body cap
    pub max_upload_bytes: usize,
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: SqliteDocumentStore,
    pub settings: Arc<UploadSettings>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last upload failure, for diagnostics
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(store: SqliteDocumentStore, settings: UploadSettings) -> Self {
        Self {
            store,
            settings: Arc::new(settings),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.settings.max_upload_bytes;

    Router::new()
        .merge(api::upload_routes())
        .merge(api::health_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
