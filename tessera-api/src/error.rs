//! Error Types for the Tessera API
//!
//! This module defines error handling for the HTTP layer, including:
//! - ApiError struct for structured error responses
//! - ErrorCode enum for categorizing errors
//! - IntoResponse implementation for Axum HTTP responses
//!
//! All errors are serialized as JSON with appropriate HTTP status codes.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tessera_core::{TesseraError, ValidationError};

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
///
/// Each error code maps to a specific HTTP status code and represents
/// a category of error that can occur during API operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    /// Value is oversized or not well-formed JSON
    InvalidPayload,

    /// Path segment or configuration value is invalid
    InvalidInput,

    // ========================================================================
    // Not Found Errors (404)
    // ========================================================================
    /// Requested key does not exist for the tenant
    KeyNotFound,

    // ========================================================================
    // Quota Errors (429)
    // ========================================================================
    /// Tenant exhausted its quota for the current window
    QuotaExceeded,

    // ========================================================================
    // Server Errors (500)
    // ========================================================================
    /// A store engine could not be reached
    StoreUnavailable,

    /// Internal server error
    InternalError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidPayload | ErrorCode::InvalidInput => StatusCode::BAD_REQUEST,

            ErrorCode::KeyNotFound => StatusCode::NOT_FOUND,

            ErrorCode::QuotaExceeded => StatusCode::TOO_MANY_REQUESTS,

            ErrorCode::StoreUnavailable | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::InvalidPayload => "Invalid payload",
            ErrorCode::InvalidInput => "Invalid input data",
            ErrorCode::KeyNotFound => "Key not found",
            ErrorCode::QuotaExceeded => "Quota exceeded",
            ErrorCode::StoreUnavailable => "Store unavailable",
            ErrorCode::InternalError => "Internal server error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response for API operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Seconds until a rejected request may be retried; sent as `retry-after`
    #[serde(skip)]
    pub retry_after_secs: Option<u64>,
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retry_after_secs: None,
        }
    }

    /// Create a new API error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    /// Attach a retry hint.
    pub fn with_retry_after(mut self, secs: u64) -> Self {
        self.retry_after_secs = Some(secs);
        self
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    /// Create an InvalidPayload error.
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidPayload, message)
    }

    /// Create an InvalidInput error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Create a KeyNotFound error.
    pub fn key_not_found(tenant: impl fmt::Display, key: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::KeyNotFound,
            format!("Key {} not found for tenant {}", key, tenant),
        )
    }

    /// Create a QuotaExceeded error.
    pub fn quota_exceeded(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::QuotaExceeded, message)
    }

    /// Create a StoreUnavailable error.
    pub fn store_unavailable() -> Self {
        Self::from_code(ErrorCode::StoreUnavailable)
    }

    /// Create an InternalError.
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let retry_after = self.retry_after_secs;
        let mut response = (status, Json(self)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

// ============================================================================
// CONVERSIONS FROM DOMAIN ERRORS
// ============================================================================

/// Convert from TesseraError to ApiError.
///
/// Storage failures are already logged by the engine that raised them; the
/// response carries a generic message so driver details never reach callers.
impl From<TesseraError> for ApiError {
    fn from(err: TesseraError) -> Self {
        match err {
            TesseraError::Validation(ValidationError::InvalidValue { field, reason }) => {
                ApiError::invalid_input(format!("Invalid {}: {}", field, reason))
            }
            TesseraError::Validation(e) => ApiError::invalid_payload(e.to_string()),
            TesseraError::QuotaExceeded { .. } => ApiError::quota_exceeded(err.to_string()),
            TesseraError::NotFound { tenant, key } => ApiError::key_not_found(tenant, key),
            TesseraError::Storage(e) => {
                tracing::debug!(error = %e, "Storage error surfaced to caller");
                ApiError::store_unavailable()
            }
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        TesseraError::from(err).into()
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;
