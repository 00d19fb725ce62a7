use thiserror::Error;

use crate::records::RecordStoreError;

/// Errors surfaced by `AuthStorage` implementations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// A setting required by the selected backend is missing or invalid.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Authenticated encryption or decryption failed.
    #[error("integrity check failed: {0}")]
    Integrity(String),
    /// A text read found nothing, or found a value that is not a string.
    #[error("{message}")]
    NotFoundOrType { message: String },
    /// The underlying store failed for a reason other than "not found" on delete.
    #[error("backend failure: {reason}")]
    Backend { reason: String },
}

impl StorageError {
    pub fn backend(reason: impl Into<String>) -> Self {
        StorageError::Backend {
            reason: reason.into(),
        }
    }
}

impl From<RecordStoreError> for StorageError {
    fn from(err: RecordStoreError) -> Self {
        StorageError::backend(err.to_string())
    }
}
