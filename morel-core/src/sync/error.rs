//! Sync error types.

use thiserror::Error;

use crate::error::StorageError;

/// Errors that can occur while talking to the remote server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Connection refused, reset or timed out.
    #[error("Connection error: {0}")]
    Transport(String),

    /// The server refused this record (4xx).
    #[error("Server rejected record ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The server failed while handling the request (5xx).
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// A 2xx response whose body could not be understood.
    #[error("Invalid server response: {0}")]
    InvalidResponse(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl SyncError {
    /// True for failures that affect every record, not just the one sent.
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::Transport(_) | SyncError::Server { .. })
    }

    pub(crate) fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if (400..500).contains(&status) {
            SyncError::Rejected { status, message }
        } else {
            SyncError::Server { status, message }
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SyncError::InvalidResponse(err.to_string())
        } else {
            SyncError::Transport(err.to_string())
        }
    }
}
