//! Store capability traits.
//!
//! These traits abstract over the concrete engines (Redis, PostgreSQL,
//! in-memory). Implementations must be thread-safe: request workers and the
//! background sync task share one instance of each.

use async_trait::async_trait;
use std::time::Duration;
use tessera_core::{ActionClass, EntryKey, TenantId, TesseraResult, Timestamp};

/// The low-latency layer serving live reads and writes.
///
/// Logical layout: one map of key to value per tenant namespace. Each
/// single-key operation must be atomic with respect to the others.
#[async_trait]
pub trait FastStore: Send + Sync {
    /// Insert or overwrite a value.
    async fn put(&self, tenant: &TenantId, key: &EntryKey, value: &[u8]) -> TesseraResult<()>;

    /// Read a value, or `None` if the key is absent.
    async fn get(&self, tenant: &TenantId, key: &EntryKey) -> TesseraResult<Option<Vec<u8>>>;

    /// Remove a key. Returns whether it existed; removing an absent key is
    /// not an error.
    async fn remove(&self, tenant: &TenantId, key: &EntryKey) -> TesseraResult<bool>;

    /// Enumerate every tenant that currently holds at least one key.
    async fn list_tenants(&self) -> TesseraResult<Vec<TenantId>>;

    /// Enumerate the keys currently held for one tenant.
    async fn list_keys(&self, tenant: &TenantId) -> TesseraResult<Vec<EntryKey>>;

    /// Check that the engine is reachable.
    async fn ping(&self) -> TesseraResult<()>;
}

/// The persistent layer used for retention and footprint accounting.
///
/// Logical layout: one table keyed by `(tenant, key)` with value and
/// last-updated columns.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Insert or overwrite the row for `(tenant, key)`. Value and timestamp
    /// are replaced unconditionally.
    async fn upsert(
        &self,
        tenant: &TenantId,
        key: &EntryKey,
        value: &[u8],
        updated_at: Timestamp,
    ) -> TesseraResult<()>;

    /// Delete the row for `(tenant, key)`. Returns whether a row existed.
    async fn delete(&self, tenant: &TenantId, key: &EntryKey) -> TesseraResult<bool>;

    /// Summed byte length of all of the tenant's values.
    async fn footprint(&self, tenant: &TenantId) -> TesseraResult<u64>;

    /// The tenant's oldest row by `updated_at`, ties broken by key order.
    async fn oldest(&self, tenant: &TenantId) -> TesseraResult<Option<(EntryKey, Timestamp)>>;

    /// Read one row's value and timestamp.
    async fn get(
        &self,
        tenant: &TenantId,
        key: &EntryKey,
    ) -> TesseraResult<Option<(Vec<u8>, Timestamp)>>;

    /// Check that the engine is reachable.
    async fn ping(&self) -> TesseraResult<()>;
}

/// Storage for fixed-window quota counters.
///
/// `try_acquire` must check and increment in one atomic step: under any
/// interleaving of concurrent callers at most `limit` calls per window may
/// return `true`.
#[async_trait]
pub trait QuotaBackend: Send + Sync {
    /// Consume one unit for `(tenant, action)` if the current window still
    /// has room. The window starts at the first unit consumed and lasts
    /// `window`; once it has elapsed the next call starts a fresh one.
    async fn try_acquire(
        &self,
        tenant: &TenantId,
        action: ActionClass,
        limit: u32,
        window: Duration,
    ) -> TesseraResult<bool>;

    /// Drop counters whose window has elapsed. Returns how many were removed.
    ///
    /// Engines whose counters expire on their own can keep the default.
    async fn prune_expired(&self, _window: Duration) -> TesseraResult<usize> {
        Ok(0)
    }
}
