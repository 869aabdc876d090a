//! Error types for the sync engine.

use thiserror::Error;

/// Errors raised by the local workout store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("store error: {0}")]
    Internal(String),
}

impl From<String> for StoreError {
    fn from(err: String) -> Self {
        StoreError::Internal(err)
    }
}

/// Errors raised by a sync pass.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("provider error: {0}")]
    Provider(#[from] trailsync_provider::ProviderError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("sync cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;
