//! Validated entry values and durable rows.

use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::identity::{EntryKey, TenantId, Timestamp};

/// Size ceiling for a single stored value (64 KiB).
pub const MAX_PAYLOAD_BYTES: usize = 64 * 1024;

/// A value that passed the size ceiling and JSON well-formedness checks.
///
/// The only way to obtain a `Payload` from untrusted bytes is
/// [`Payload::parse`], so every value that reaches a store is valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload(Vec<u8>);

impl Payload {
    /// Validate raw request bytes.
    ///
    /// The size check runs before parsing so oversized bodies are rejected
    /// without touching the JSON parser.
    pub fn parse(bytes: impl Into<Vec<u8>>) -> Result<Self, ValidationError> {
        let bytes = bytes.into();
        if bytes.len() > MAX_PAYLOAD_BYTES {
            return Err(ValidationError::PayloadTooLarge {
                size: bytes.len(),
                limit: MAX_PAYLOAD_BYTES,
            });
        }
        serde_json::from_slice::<IgnoredAny>(&bytes).map_err(|e| {
            ValidationError::MalformedPayload {
                reason: e.to_string(),
            }
        })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One row of the durable layer, keyed by `(tenant, key)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurableRow {
    pub tenant: TenantId,
    pub key: EntryKey,
    pub value: Vec<u8>,
    pub updated_at: Timestamp,
}
