//! Sync-layer error types.

use thiserror::Error;
use zinic_core::error::ZinicError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid stored document: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("credential error: {0}")]
    Credential(String),
}

impl From<SyncError> for ZinicError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Io(_) | SyncError::Serde(_) => ZinicError::Storage(err.to_string()),
            SyncError::Credential(message) => ZinicError::malformed("credential", message),
        }
    }
}
