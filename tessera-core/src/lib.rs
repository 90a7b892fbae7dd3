//! Tessera Core - Domain Types
//!
//! Tenant-scoped identifiers, validated payloads, quota policy and the error
//! taxonomy shared by the storage engines and the service layer. This crate
//! contains no I/O.

pub mod error;
pub mod identity;
pub mod payload;
pub mod policy;

pub use error::{StorageError, TesseraError, TesseraResult, ValidationError};
pub use identity::{EntryKey, TenantId, Timestamp};
pub use payload::{DurableRow, Payload, MAX_PAYLOAD_BYTES};
pub use policy::{
    ActionClass, QuotaPolicy, DEFAULT_QUOTA_WINDOW_SECS, DEFAULT_READ_LIMIT,
    DEFAULT_SYNC_INTERVAL_SECS, DEFAULT_TENANT_CAP_BYTES, DEFAULT_WRITE_LIMIT,
};
