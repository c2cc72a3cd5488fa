//! Storage error types.

use thiserror::Error;

/// Errors reported by backends and storages.
///
/// Expected failure modes are returned as values; nothing in the storage
/// layer panics on a missing record or a failed write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// The record is missing an identifier or cannot be serialized.
    #[error("validation error: {0}")]
    Validation(String),

    /// No record with this identifier exists.
    #[error("record not found: {0}")]
    NotFound(String),

    /// The backend failed (I/O, quota, corruption).
    #[error("backend error: {0}")]
    Backend(String),

    /// The storage could not be initialized.
    #[error("storage not initialized: {0}")]
    Uninitialized(String),
}

impl StorageError {
    pub fn validation(message: impl Into<String>) -> Self {
        StorageError::Validation(message.into())
    }

    pub fn not_found(identifier: impl Into<String>) -> Self {
        StorageError::NotFound(identifier.into())
    }

    pub fn backend(message: impl Into<String>) -> Self {
        StorageError::Backend(message.into())
    }

    /// Returns true for a missing record.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StorageError::NotFound("row".to_string()),
            other => StorageError::Backend(other.to_string()),
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
