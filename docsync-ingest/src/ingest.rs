//! Upload pipeline: bytes → JSON → normalized records → store

use serde_json::Value as JsonValue;
use tracing::info;

use crate::db::DocumentStore;
use crate::error::{ImportError, ImportFailure};
use crate::normalize::normalize;
use crate::reconcile::{ImportReport, Reconciler};

/// Reconcile an uploaded JSON document into `collection`
///
/// The root must be an array of records. The whole array is normalized
/// before the first upsert, so a malformed timestamp anywhere rejects the
/// upload without touching the store.
pub async fn ingest_json<S: DocumentStore + ?Sized>(
    store: &S,
    collection: &str,
    bytes: &[u8],
) -> Result<ImportReport, ImportFailure> {
    let raw: JsonValue = serde_json::from_slice(bytes)
        .map_err(|e| ImportError::MalformedInput(format!("invalid JSON: {}", e)))?;

    let items = match raw {
        JsonValue::Array(items) => items,
        other => {
            return Err(ImportError::MalformedInput(format!(
                "expected an array of records at the root, found {}",
                kind_name(&other)
            ))
            .into())
        }
    };

    let records = items
        .into_iter()
        .map(normalize)
        .collect::<Result<Vec<_>, _>>()?;
    info!(records = records.len(), collection, "Normalized upload");

    Reconciler::new(store, collection).reconcile(records).await
}

fn kind_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}
