//! Quota and capacity policy.
//!
//! The numbers here are policy, not mechanism: the limiter and the sync
//! engine take them as configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::ValidationError;

/// Default successful reads per tenant per window.
pub const DEFAULT_READ_LIMIT: u32 = 10_000;

/// Default successful writes (puts and deletes) per tenant per window.
pub const DEFAULT_WRITE_LIMIT: u32 = 1_000;

/// Default fixed window length in seconds.
pub const DEFAULT_QUOTA_WINDOW_SECS: u64 = 60;

/// Default per-tenant durable footprint cap (100 MiB).
pub const DEFAULT_TENANT_CAP_BYTES: u64 = 100 * 1024 * 1024;

/// Default period between sync cycles in seconds.
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 10;

/// Class of request a quota unit is charged against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionClass {
    Read,
    Write,
}

impl ActionClass {
    /// Stable label used in counter keys and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionClass::Read => "read",
            ActionClass::Write => "write",
        }
    }
}

impl fmt::Display for ActionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-window ceilings for each action class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaPolicy {
    pub read_limit: u32,
    pub write_limit: u32,
    pub window: Duration,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            read_limit: DEFAULT_READ_LIMIT,
            write_limit: DEFAULT_WRITE_LIMIT,
            window: Duration::from_secs(DEFAULT_QUOTA_WINDOW_SECS),
        }
    }
}

impl QuotaPolicy {
    /// Ceiling for the given action class.
    pub fn limit_for(&self, action: ActionClass) -> u32 {
        match action {
            ActionClass::Read => self.read_limit,
            ActionClass::Write => self.write_limit,
        }
    }

    /// Reject policies that cannot admit traffic or that invert the
    /// write-below-read ordering.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.read_limit == 0 || self.write_limit == 0 {
            return Err(ValidationError::InvalidValue {
                field: "quota".to_string(),
                reason: "limits must be non-zero".to_string(),
            });
        }
        if self.write_limit >= self.read_limit {
            return Err(ValidationError::InvalidValue {
                field: "write_limit".to_string(),
                reason: format!(
                    "must be lower than read_limit ({} >= {})",
                    self.write_limit, self.read_limit
                ),
            });
        }
        if self.window.is_zero() {
            return Err(ValidationError::InvalidValue {
                field: "window".to_string(),
                reason: "must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = QuotaPolicy::default();
        assert_eq!(policy.limit_for(ActionClass::Read), 10_000);
        assert_eq!(policy.limit_for(ActionClass::Write), 1_000);
        assert_eq!(policy.window, Duration::from_secs(60));
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_write_must_be_below_read() {
        let policy = QuotaPolicy {
            read_limit: 10,
            write_limit: 10,
            ..Default::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_zero_window_rejected() {
        let policy = QuotaPolicy {
            window: Duration::ZERO,
            ..Default::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_action_labels() {
        assert_eq!(ActionClass::Read.as_str(), "read");
        assert_eq!(ActionClass::Write.to_string(), "write");
        assert_eq!(serde_json::to_string(&ActionClass::Write).unwrap(), "\"write\"");
    }
}
