//! Identity types for tenant-scoped entries
//!
//! A `TenantId` and an `EntryKey` together identify one entry. Both are
//! opaque strings; the constructors only reject values that would break the
//! fast layer's `tenant:{id}` namespace or the HTTP path layout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Maximum length of a tenant identifier in bytes.
pub const MAX_TENANT_ID_BYTES: usize = 256;

/// Maximum length of an entry key in bytes.
pub const MAX_ENTRY_KEY_BYTES: usize = 1024;

/// Opaque tenant identifier.
///
/// Tenants are never created explicitly: a tenant exists as soon as one key
/// is written under it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    pub fn new(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = raw.into();
        validate_segment("tenant", &raw, MAX_TENANT_ID_BYTES)?;
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TenantId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TenantId> for String {
    fn from(value: TenantId) -> Self {
        value.0
    }
}

/// Key of an entry within a tenant namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntryKey(String);

impl EntryKey {
    pub fn new(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = raw.into();
        validate_segment("key", &raw, MAX_ENTRY_KEY_BYTES)?;
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for EntryKey {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EntryKey> for String {
    fn from(value: EntryKey) -> Self {
        value.0
    }
}

fn validate_segment(field: &str, raw: &str, max_len: usize) -> Result<(), ValidationError> {
    if raw.is_empty() {
        return Err(ValidationError::InvalidValue {
            field: field.to_string(),
            reason: "must not be empty".to_string(),
        });
    }
    if raw.len() > max_len {
        return Err(ValidationError::InvalidValue {
            field: field.to_string(),
            reason: format!("must be at most {} bytes", max_len),
        });
    }
    if raw.contains('/') {
        return Err(ValidationError::InvalidValue {
            field: field.to_string(),
            reason: "must not contain '/'".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_id_accepts_plain_names() {
        let tenant = TenantId::new("acme").unwrap();
        assert_eq!(tenant.as_str(), "acme");
        assert_eq!(tenant.to_string(), "acme");
    }

    #[test]
    fn test_tenant_id_rejects_empty_and_slash() {
        assert!(TenantId::new("").is_err());
        assert!(TenantId::new("a/b").is_err());
        assert!(TenantId::new("x".repeat(MAX_TENANT_ID_BYTES + 1)).is_err());
    }

    #[test]
    fn test_entry_key_limits() {
        assert!(EntryKey::new("cfg1").is_ok());
        assert!(EntryKey::new("k".repeat(MAX_ENTRY_KEY_BYTES)).is_ok());
        assert!(EntryKey::new("k".repeat(MAX_ENTRY_KEY_BYTES + 1)).is_err());
    }

    #[test]
    fn test_serde_goes_through_validation() {
        let ok: TenantId = serde_json::from_str("\"acme\"").unwrap();
        assert_eq!(ok.as_str(), "acme");
        assert!(serde_json::from_str::<TenantId>("\"\"").is_err());
    }
}
