//! Error types for ZQLZ

use thiserror::Error;

/// Core error type shared by drivers, connections and services
#[derive(Error, Debug)]
pub enum ZqlzError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl ZqlzError {
    /// Whether the error came from a cancelled operation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ZqlzError::Cancelled)
    }
}

/// Result type alias for ZQLZ operations
pub type Result<T> = std::result::Result<T, ZqlzError>;
