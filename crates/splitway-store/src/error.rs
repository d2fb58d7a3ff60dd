//! Error types for the splitway metric store.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for metric store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during metric store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("metrics directory {0} does not exist; it must be mounted before startup")]
    NotMounted(PathBuf),

    #[error("invalid storage configuration: {0}")]
    Config(String),

    #[error("key encoding error: {0}")]
    Encoding(String),

    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("command error: {0}")]
    Command(String),
}

impl StoreError {
    /// Whether a caller may reasonably retry the failed operation.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Transaction(_)
                | StoreError::Read(_)
                | StoreError::Write(_)
                | StoreError::Connection(_)
                | StoreError::Command(_)
        )
    }
}
