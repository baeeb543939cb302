//! JSON upload endpoint
//!
//! POST /upload-json with a multipart `file` part holding a `.json` export.

use axum::{
    body::Bytes,
    extract::{multipart::MultipartRejection, Multipart, State},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use tracing::{error, info};

use crate::error::{ApiError, ApiResult};
use crate::ingest::ingest_json;
use crate::utils::stage_upload;
use crate::AppState;

/// Multipart field carrying the upload
pub const FILE_FIELD: &str = "file";

pub const NO_FILE_PART: &str = "No file part in the request";
pub const NO_FILE_SELECTED: &str = "No file selected";
pub const INVALID_FILE_FORMAT: &str = "Invalid file format. Please upload a JSON file.";
pub const UPLOAD_SUCCEEDED: &str = "JSON file uploaded and data updated in the document store.";

/// POST /upload-json response
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
}

/// POST /upload-json
///
/// Validates the file part, stages it, and reconciles its records into the
/// configured collection.
pub async fn upload_json(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<UploadResponse>> {
    let Ok(mut multipart) = multipart else {
        return Err(ApiError::BadRequest(NO_FILE_PART.to_string()));
    };

    let (file_name, contents) = match read_file_part(&mut multipart).await {
        Ok(part) => part,
        Err(err @ ApiError::Processing { .. }) => {
            return Err(record_failure(&state, "<unread>", err).await)
        }
        Err(err) => return Err(err),
    };

    let contents = match stage_and_read(&state, &file_name, &contents).await {
        Ok(contents) => contents,
        Err(e) => return Err(record_failure(&state, &file_name, ApiError::from(e)).await),
    };

    match ingest_json(&state.store, &state.settings.collection, &contents).await {
        Ok(report) => {
            info!(
                file = %file_name,
                collection = %state.settings.collection,
                inserted = report.inserted(),
                updated = report.updated(),
                skipped = report.skipped(),
                "Upload reconciled"
            );
            Ok(Json(UploadResponse {
                message: UPLOAD_SUCCEEDED.to_string(),
                inserted: report.inserted(),
                updated: report.updated(),
                skipped: report.skipped(),
            }))
        }
        Err(failure) => Err(record_failure(&state, &file_name, ApiError::from(failure)).await),
    }
}

/// Find the `file` part and check its name before reading its body
///
/// A stream that breaks mid-read (truncated body, size cap exceeded) is a
/// processing failure, not a validation one.
async fn read_file_part(multipart: &mut Multipart) -> ApiResult<(String, Bytes)> {
    while let Some(field) = multipart.next_field().await.map_err(ApiError::processing)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        // A `file` part without a filename is a plain form value, not a file
        let Some(file_name) = field.file_name().map(str::to_owned) else {
            continue;
        };

        if file_name.is_empty() {
            return Err(ApiError::BadRequest(NO_FILE_SELECTED.to_string()));
        }
        if !file_name.ends_with(".json") {
            return Err(ApiError::BadRequest(INVALID_FILE_FORMAT.to_string()));
        }

        let contents = field.bytes().await.map_err(ApiError::processing)?;
        return Ok((file_name, contents));
    }

    Err(ApiError::BadRequest(NO_FILE_PART.to_string()))
}

async fn stage_and_read(state: &AppState, file_name: &str, contents: &[u8]) -> std::io::Result<Vec<u8>> {
    let staged = stage_upload(&state.settings.upload_dir, file_name, contents).await?;
    staged.read().await
}

async fn record_failure(state: &AppState, file_name: &str, err: ApiError) -> ApiError {
    error!(file = %file_name, error = %err, "Error processing file");
    *state.last_error.write().await = Some(err.to_string());
    err
}

/// Build upload routes
pub fn upload_routes() -> Router<AppState> {
    Router::new().route("/upload-json", post(upload_json))
}
