use std::path::PathBuf;

use thiserror::Error;

/// Failure kinds of the upload workflow.
///
/// Everything except [`UploadError::MissingCredential`] and unreadable input is
/// scoped to a single sample: the run logs it and moves on.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("malformed row {row}: {reason}")]
    MalformedRow { row: usize, reason: String },

    #[error("unresolvable coordinates for {sample_id}: {reason}")]
    UnresolvableCoordinates { sample_id: String, reason: String },

    #[error("remote request failed: {0}")]
    RemoteTransient(String),

    #[error("sample {sample_id} failed: {reason}")]
    PerRecordFailure { sample_id: String, reason: String },

    #[error("state file {path} is corrupt: {reason}")]
    StateStoreCorrupt { path: PathBuf, reason: String },

    #[error("HTTP client setup failed: {0}")]
    ClientSetup(String),

    #[error("access token required for non-dry-run (set {0})")]
    MissingCredential(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl UploadError {
    pub fn per_record(sample_id: &str, reason: impl Into<String>) -> Self {
        UploadError::PerRecordFailure {
            sample_id: sample_id.to_string(),
            reason: reason.into(),
        }
    }

    pub fn unresolvable(sample_id: &str, reason: impl Into<String>) -> Self {
        UploadError::UnresolvableCoordinates {
            sample_id: sample_id.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, UploadError>;
