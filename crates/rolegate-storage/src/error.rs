//! Storage error types.

use thiserror::Error;

/// Storage-specific errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("row not found in '{model}'")]
    RowNotFound { model: String },

    #[error("query error: {0}")]
    QueryError(String),

    #[error("connection error: {0}")]
    ConnectionError(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
