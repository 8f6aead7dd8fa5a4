//! Error types for data transfer

use thiserror::Error;
use zqlz_core::ZqlzError;

/// Errors that can occur while mapping or transferring data
#[derive(Debug, Error)]
pub enum TransferError {
    /// Failure reported by a driver or connection
    #[error("Database error: {0}")]
    Database(#[from] ZqlzError),

    /// A result-set column has no counterpart in the table mapping
    #[error("Can't find target attribute [{0}]")]
    MissingTargetAttribute(String),

    /// A column mapping is neither skipped nor bound to a target column
    #[error("Target attribute for [{0}] wasn't resolved")]
    UnresolvedAttribute(String),

    /// A table created during the transfer did not show up in its container
    #[error("New table {table} not found in container {container}")]
    TargetNotFound { table: String, container: String },

    /// The mapping still has unresolved parts
    #[error("Mapping for {0} is incomplete")]
    IncompleteMapping(String),

    #[error("No target container selected")]
    NoTargetContainer,

    /// Target DDL failed to execute
    #[error("Failed to execute DDL: {source}")]
    Ddl {
        sql: String,
        #[source]
        source: ZqlzError,
    },

    #[error("Transfer cancelled")]
    Cancelled,

    /// A worker task panicked or was aborted
    #[error("Transfer task failed: {0}")]
    Task(String),
}

impl TransferError {
    pub fn is_cancelled(&self) -> bool {
        match self {
            TransferError::Cancelled => true,
            TransferError::Database(e) => e.is_cancelled(),
            _ => false,
        }
    }
}

/// Result type for transfer operations
pub type TransferResult<T> = Result<T, TransferError>;
