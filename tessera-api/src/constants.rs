//! Constants for the Tessera API
//!
//! Policy defaults (quota ceilings, window, footprint cap, sync period) live
//! in `tessera_core::policy`; this module holds the process-level ones.

// ============================================================================
// SERVER
// ============================================================================

/// Default HTTP listen address
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

/// Default grace period for in-flight requests on shutdown, in seconds
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 5;

/// Upper bound on request bodies accepted before payload validation.
///
/// Slightly above the payload ceiling so oversized bodies still reach the
/// service and are rejected as invalid payloads rather than by the framework.
pub const MAX_REQUEST_BODY_BYTES: usize = 2 * tessera_core::MAX_PAYLOAD_BYTES;

// ============================================================================
// STORES
// ============================================================================

/// Default fast-layer endpoint
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

// ============================================================================
// BACKGROUND JOBS
// ============================================================================

/// Default period between quota counter pruning passes, in seconds
pub const DEFAULT_QUOTA_PRUNE_INTERVAL_SECS: u64 = 60;
