//! Upload staging
//!
//! Uploaded files are written to the staging directory under a unique,
//! sanitized name, read back for processing, and removed when the
//! [`StagedUpload`] guard is dropped.

use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const FALLBACK_NAME: &str = "upload.json";

/// Reduce a client-supplied file name to a safe file system name
///
/// Path separators and whitespace runs become `_`, characters outside
/// `[A-Za-z0-9_.-]` are dropped, and leading/trailing `.`/`_` are trimmed.
/// May return an empty string.
pub fn secure_filename(name: &str) -> String {
    let spaced: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();

    kept.trim_matches(|c| c == '.' || c == '_').to_string()
}

/// A staged upload on disk, removed on drop
#[derive(Debug)]
pub struct StagedUpload {
    path: PathBuf,
}

impl StagedUpload {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read(&self) -> io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove staged upload"
            );
        }
    }
}

/// Write `contents` to `dir` under `<uuid>-<sanitized name>`
pub async fn stage_upload(dir: &Path, file_name: &str, contents: &[u8]) -> io::Result<StagedUpload> {
    let safe = secure_filename(file_name);
    let safe = if safe.is_empty() { FALLBACK_NAME } else { safe.as_str() };

    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!("{}-{}", Uuid::new_v4(), safe));
    tokio::fs::write(&path, contents).await?;

    tracing::debug!(path = %path.display(), bytes = contents.len(), "Staged upload");
    Ok(StagedUpload { path })
}
