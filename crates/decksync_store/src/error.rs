//! Error types for the collection store.

use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in collection store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON error while reading or writing a `col` blob.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Collection file is already opened by another process.
    #[error("collection locked: another process has exclusive access")]
    CollectionLocked,

    /// The collection failed an integrity or structural check.
    #[error("collection corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// A referenced object does not exist.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Object kind (`note`, `model`, ...).
        kind: &'static str,
        /// Object id.
        id: i64,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },
}

impl StoreError {
    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    pub fn not_found(kind: &'static str, id: i64) -> Self {
        Self::NotFound { kind, id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = StoreError::not_found("model", 42);
        assert_eq!(err.to_string(), "model 42 not found");

        let err = StoreError::corrupted("orphan cards");
        assert!(err.to_string().contains("orphan cards"));
    }
}
