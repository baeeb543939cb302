//! Error types for docsync-ingest
//!
//! [`ImportError`] classifies why an upload could not be reconciled.
//! [`ImportFailure`] adds where in the batch it happened and which upserts
//! were already committed. [`ApiError`] is the HTTP boundary form.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;
use thiserror::Error;

use crate::reconcile::UpsertOutcome;

/// Why an upload could not be reconciled
#[derive(Debug, Error)]
pub enum ImportError {
    /// Not valid JSON, or the root value is not an array
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// A `$date` wrapper whose string is not an export timestamp
    #[error("malformed timestamp {value:?}: {reason}")]
    MalformedTimestamp { value: String, reason: String },

    /// A `$oid` wrapper whose string is not a record identifier
    #[error("invalid record identifier {value:?}: expected 24 hexadecimal characters")]
    InvalidIdentifier { value: String },

    /// The document store rejected or could not perform an upsert
    #[error("store upsert failed: {0}")]
    Store(#[from] docsync_common::Error),
}

/// A failed upload
///
/// `position` is the index of the record being processed when the failure
/// happened, or `None` when the upload failed before reconciliation began.
/// `committed` holds the outcomes of every record before `position`; those
/// upserts are not rolled back.
#[derive(Debug)]
pub struct ImportFailure {
    pub position: Option<usize>,
    pub committed: Vec<UpsertOutcome>,
    pub source: ImportError,
}

impl ImportFailure {
    pub fn at(position: usize, committed: Vec<UpsertOutcome>, source: ImportError) -> Self {
        Self {
            position: Some(position),
            committed,
            source,
        }
    }

    /// Number of store writes that succeeded before the failure
    pub fn committed_upserts(&self) -> usize {
        self.committed.iter().filter(|o| o.is_upsert()).count()
    }
}

impl From<ImportError> for ImportFailure {
    fn from(source: ImportError) -> Self {
        Self {
            position: None,
            committed: Vec::new(),
            source,
        }
    }
}

impl fmt::Display for ImportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            None => write!(f, "{}", self.source),
            Some(position) => write!(
                f,
                "record {}: {} ({} earlier records committed)",
                position,
                self.source,
                self.committed_upserts()
            ),
        }
    }
}

impl std::error::Error for ImportFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Message returned with every 500 response
pub const PROCESSING_FAILED: &str = "Failed to process file";

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Input validation failure (400)
    #[error("{0}")]
    BadRequest(String),

    /// Processing failure (500), with the underlying detail
    #[error("{message}: {error}")]
    Processing { message: String, error: String },
}

impl ApiError {
    pub fn processing(error: impl fmt::Display) -> Self {
        ApiError::Processing {
            message: PROCESSING_FAILED.to_string(),
            error: error.to_string(),
        }
    }
}

impl From<ImportFailure> for ApiError {
    fn from(failure: ImportFailure) -> Self {
        ApiError::processing(failure)
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::processing(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, json!({ "message": message })),
            ApiError::Processing { message, error } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "message": message, "error": error }),
            ),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
