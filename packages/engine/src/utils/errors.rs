// packages/engine/src/utils/errors.rs
//! Error types shared by the recorder, the persistence worker and the exporter

use thiserror::Error;

/// Errors raised by the recording pipeline
#[derive(Debug, Error)]
pub enum RecorderError {
    /// The store could not be opened, created or committed
    #[error("storage failed: {0}")]
    StorageFailed(String),
    
    /// A queued record could not be written to the store
    #[error("persist failed: {0}")]
    PersistFailed(String),
    
    /// The background worker could not be spawned or panicked
    #[error("worker failed: {0}")]
    WorkerFailed(String),
    
    /// A persisted row could not be decoded during export
    #[error("decode failed: {0}")]
    DecodeFailed(String),
    
    /// The merged trace could not be produced or written
    #[error("export failed: {0}")]
    ExportFailed(String),
    
    /// Invalid or unreadable configuration
    #[error("config error: {0}")]
    ConfigError(String),
}

pub type Result<T> = std::result::Result<T, RecorderError>;

impl From<config::ConfigError> for RecorderError {
    fn from(e: config::ConfigError) -> Self {
        RecorderError::ConfigError(e.to_string())
    }
}
