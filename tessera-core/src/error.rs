//! Error types for Tessera operations

use crate::policy::ActionClass;
use thiserror::Error;

/// Payload and identifier validation errors.
///
/// These are permanent: the caller must change the request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Payload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Payload is not well-formed JSON: {reason}")]
    MalformedPayload { reason: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Storage layer errors.
///
/// `Unavailable` is transient; the request path surfaces it immediately and
/// the sync loop logs it and moves on.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("{backend} unavailable: {reason}")]
    Unavailable { backend: String, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("Corrupt data in {backend}: {reason}")]
    Corrupt { backend: String, reason: String },
}

impl StorageError {
    /// Shorthand for an `Unavailable` error.
    pub fn unavailable(backend: impl Into<String>, reason: impl ToString) -> Self {
        StorageError::Unavailable {
            backend: backend.into(),
            reason: reason.to_string(),
        }
    }
}

/// Master error type for all Tessera errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TesseraError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("{action} quota exceeded for tenant {tenant}")]
    QuotaExceeded { tenant: String, action: ActionClass },

    #[error("Key {key} not found for tenant {tenant}")]
    NotFound { tenant: String, key: String },
}

/// Result type alias for Tessera operations.
pub type TesseraResult<T> = Result<T, TesseraError>;
