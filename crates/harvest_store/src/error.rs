//! Error types for the harvest store

use std::path::Path;

use thiserror::Error;

/// Errors raised by local storage (progress record, batch manifest, batch logs)
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Batch {0} not found")]
    BatchNotFound(u64),
    #[error("Batch {0} is the active batch")]
    ActiveBatch(u64),
    #[error("Batch {0} has no addresses yet")]
    EmptyBatch(u64),
}

impl StoreError {
    /// Wrap an IO failure together with the path it happened on
    pub(crate) fn io(path: &Path, err: std::io::Error) -> Self {
        StoreError::StorageError(format!("{}: {}", path.display(), err))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::SerializationError(err.to_string())
    }
}

/// Errors from the block explorer HTTP API
#[derive(Error, Debug)]
pub enum ExplorerError {
    #[error("HTTP error: {0}")]
    HttpError(String),
    #[error("JSON parsing error: {0}")]
    JsonError(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Explorer returned status {0}")]
    BadStatus(u16),
}

/// Errors returned by the scan control surface
#[derive(Error, Debug)]
pub enum ScanControlError {
    #[error("A scan is already running")]
    AlreadyRunning,
    #[error(transparent)]
    Store(#[from] StoreError),
}
