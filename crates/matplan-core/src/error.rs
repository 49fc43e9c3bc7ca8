//! Error types for matplan-core

use thiserror::Error;

/// Result type alias using matplan-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in matplan-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Local persistence layer failed to open or is not initialized.
    /// Fatal for offline features; clients should degrade to online-only.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// libSQL error during a storage operation
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote service failure surfaced from a pull refresh
    #[error("Remote service error: {0}")]
    Remote(String),
}
