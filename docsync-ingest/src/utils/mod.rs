//! Utility modules for docsync-ingest

pub mod db_retry;
pub mod staging;

pub use db_retry::retry_on_lock;
pub use staging::{secure_filename, stage_upload, StagedUpload};
