//! Health check endpoint
//!
//! Reports whether the document store answers queries, how many documents
//! the upload collection holds, and the last upload failure.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use tracing::warn;

use crate::AppState;

/// Document store section of the health report
#[derive(Debug, Serialize)]
pub struct StoreHealth {
    pub reachable: bool,
    /// Collection uploads are reconciled into
    pub collection: String,
    /// Documents currently in `collection`; absent when the store is down
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documents: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok", or "degraded" when the store cannot be queried
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub store: StoreHealth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// GET /health
///
/// 200 when the store is reachable, 503 otherwise.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let collection = state.settings.collection.clone();

    let documents = match state.store.ping().await {
        Ok(()) => state.store.count(&collection).await,
        Err(e) => Err(e),
    };
    let documents = match documents {
        Ok(count) => Some(count),
        Err(e) => {
            warn!("Health check: document store unavailable: {}", e);
            None
        }
    };
    let reachable = documents.is_some();

    let uptime_seconds = Utc::now()
        .signed_duration_since(state.startup_time)
        .num_seconds()
        .max(0) as u64;

    let (status, label) = if reachable {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    let response = HealthResponse {
        status: label,
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds,
        store: StoreHealth {
            reachable,
            collection,
            documents,
        },
        last_error: state.last_error.read().await.clone(),
    };

    (status, Json(response))
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
