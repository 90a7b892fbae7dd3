//! Tessera Test Utilities
//!
//! Shared test infrastructure for the Tessera workspace:
//! - Proptest generators for identifiers and JSON payloads
//! - Fault-injecting store wrappers for failure-isolation tests
//! - Fixtures for common scenarios
//! - Assertions on the error taxonomy

pub use tessera_core::{
    ActionClass, EntryKey, QuotaPolicy, StorageError, TenantId, TesseraError, TesseraResult,
    Timestamp, ValidationError, MAX_PAYLOAD_BYTES,
};
pub use tessera_storage::{
    DurableStore, FastStore, MemoryDurableStore, MemoryFastStore, QuotaBackend, WindowCounters,
};

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

// ============================================================================
// FAULT-INJECTING STORES
// ============================================================================

fn injected(backend: &str) -> TesseraError {
    StorageError::unavailable(backend, "injected failure").into()
}

/// Durable layer whose upserts fail for selected tenants or keys.
///
/// Every other call goes to an in-memory durable store. Deletes can be
/// switched to fail for all tenants.
#[derive(Debug, Default)]
pub struct FlakyDurableStore {
    inner: MemoryDurableStore,
    failing_tenants: RwLock<BTreeSet<TenantId>>,
    failing_keys: RwLock<BTreeSet<(TenantId, EntryKey)>>,
    fail_deletes: AtomicBool,
    upsert_attempts: AtomicU64,
}

impl FlakyDurableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every upsert for `tenant` fail until [`heal`](Self::heal).
    pub fn fail_upserts_for(&self, tenant: &TenantId) {
        if let Ok(mut set) = self.failing_tenants.write() {
            set.insert(tenant.clone());
        }
    }

    /// Make upserts of one key fail until [`heal`](Self::heal).
    pub fn fail_upserts_for_key(&self, tenant: &TenantId, key: &EntryKey) {
        if let Ok(mut set) = self.failing_keys.write() {
            set.insert((tenant.clone(), key.clone()));
        }
    }

    pub fn heal(&self, tenant: &TenantId) {
        if let Ok(mut set) = self.failing_tenants.write() {
            set.remove(tenant);
        }
        if let Ok(mut set) = self.failing_keys.write() {
            set.retain(|(t, _)| t != tenant);
        }
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Upserts attempted, failed or not.
    pub fn upsert_attempts(&self) -> u64 {
        self.upsert_attempts.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &MemoryDurableStore {
        &self.inner
    }

    fn upserts_failing(&self, tenant: &TenantId, key: &EntryKey) -> bool {
        let tenant_failing = self
            .failing_tenants
            .read()
            .map(|set| set.contains(tenant))
            .unwrap_or(true);
        tenant_failing
            || self
                .failing_keys
                .read()
                .map(|set| set.contains(&(tenant.clone(), key.clone())))
                .unwrap_or(true)
    }
}

#[async_trait]
impl DurableStore for FlakyDurableStore {
    async fn upsert(
        &self,
        tenant: &TenantId,
        key: &EntryKey,
        value: &[u8],
        updated_at: Timestamp,
    ) -> TesseraResult<()> {
        self.upsert_attempts.fetch_add(1, Ordering::SeqCst);
        if self.upserts_failing(tenant, key) {
            return Err(injected("postgres"));
        }
        self.inner.upsert(tenant, key, value, updated_at).await
    }

    async fn delete(&self, tenant: &TenantId, key: &EntryKey) -> TesseraResult<bool> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(injected("postgres"));
        }
        self.inner.delete(tenant, key).await
    }

    async fn footprint(&self, tenant: &TenantId) -> TesseraResult<u64> {
        self.inner.footprint(tenant).await
    }

    async fn oldest(&self, tenant: &TenantId) -> TesseraResult<Option<(EntryKey, Timestamp)>> {
        self.inner.oldest(tenant).await
    }

    async fn get(
        &self,
        tenant: &TenantId,
        key: &EntryKey,
    ) -> TesseraResult<Option<(Vec<u8>, Timestamp)>> {
        self.inner.get(tenant, key).await
    }

    async fn ping(&self) -> TesseraResult<()> {
        self.inner.ping().await
    }
}

/// Fast layer that can refuse enumeration, fail single reads, or go down
/// entirely.
#[derive(Debug, Default)]
pub struct FailingFastStore {
    inner: MemoryFastStore,
    fail_listing: AtomicBool,
    failing_key_listings: RwLock<BTreeSet<TenantId>>,
    failing_reads: RwLock<BTreeSet<(TenantId, EntryKey)>>,
    down: AtomicBool,
}

impl FailingFastStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `list_tenants` fail while every other call keeps working.
    pub fn fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    /// Make `list_keys` fail for one tenant.
    pub fn fail_key_listing_for(&self, tenant: &TenantId) {
        if let Ok(mut set) = self.failing_key_listings.write() {
            set.insert(tenant.clone());
        }
    }

    /// Make `get` fail for one key.
    pub fn fail_reads_for(&self, tenant: &TenantId, key: &EntryKey) {
        if let Ok(mut set) = self.failing_reads.write() {
            set.insert((tenant.clone(), key.clone()));
        }
    }

    /// Make every call fail.
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &MemoryFastStore {
        &self.inner
    }

    fn check(&self) -> TesseraResult<()> {
        if self.down.load(Ordering::SeqCst) {
            Err(injected("redis"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl FastStore for FailingFastStore {
    async fn put(&self, tenant: &TenantId, key: &EntryKey, value: &[u8]) -> TesseraResult<()> {
        self.check()?;
        self.inner.put(tenant, key, value).await
    }

    async fn get(&self, tenant: &TenantId, key: &EntryKey) -> TesseraResult<Option<Vec<u8>>> {
        self.check()?;
        let read_failing = self
            .failing_reads
            .read()
            .map(|set| set.contains(&(tenant.clone(), key.clone())))
            .unwrap_or(true);
        if read_failing {
            return Err(injected("redis"));
        }
        self.inner.get(tenant, key).await
    }

    async fn remove(&self, tenant: &TenantId, key: &EntryKey) -> TesseraResult<bool> {
        self.check()?;
        self.inner.remove(tenant, key).await
    }

    async fn list_tenants(&self) -> TesseraResult<Vec<TenantId>> {
        self.check()?;
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(injected("redis"));
        }
        self.inner.list_tenants().await
    }

    async fn list_keys(&self, tenant: &TenantId) -> TesseraResult<Vec<EntryKey>> {
        self.check()?;
        let listing_failing = self
            .failing_key_listings
            .read()
            .map(|set| set.contains(tenant))
            .unwrap_or(true);
        if listing_failing {
            return Err(injected("redis"));
        }
        self.inner.list_keys(tenant).await
    }

    async fn ping(&self) -> TesseraResult<()> {
        self.check()
    }
}

/// Quota counter backend that can never be reached.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnreachableQuotaBackend;

#[async_trait]
impl QuotaBackend for UnreachableQuotaBackend {
    async fn try_acquire(
        &self,
        _tenant: &TenantId,
        _action: ActionClass,
        _limit: u32,
        _window: Duration,
    ) -> TesseraResult<bool> {
        Err(injected("quota"))
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Tessera inputs.

    use super::*;
    use proptest::prelude::*;
    use serde_json::Value;

    /// Generate a valid tenant identifier.
    pub fn arb_tenant_id() -> impl Strategy<Value = TenantId> {
        "[a-z][a-z0-9_-]{0,15}".prop_filter_map("valid tenant id", |s| TenantId::new(s).ok())
    }

    /// Generate a valid entry key.
    pub fn arb_entry_key() -> impl Strategy<Value = EntryKey> {
        "[a-zA-Z0-9][a-zA-Z0-9:._-]{0,31}".prop_filter_map("valid key", |s| EntryKey::new(s).ok())
    }

    /// Generate an arbitrary JSON document.
    pub fn arb_json_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[a-zA-Z0-9 ]{0,24}".prop_map(Value::from),
        ];
        leaf.prop_recursive(3, 32, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,8}", inner, 0..6)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    /// Generate the bytes of a well-formed JSON document.
    pub fn arb_json_payload() -> impl Strategy<Value = Vec<u8>> {
        arb_json_value().prop_map(|v| v.to_string().into_bytes())
    }

    /// Generate bytes that never parse as JSON.
    pub fn arb_malformed_payload() -> impl Strategy<Value = Vec<u8>> {
        "[a-z]{1,16}".prop_map(|s| format!("{{{}", s).into_bytes())
    }

    /// Generate a timestamp between 2020 and 2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1_577_836_800i64..1_893_456_000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(chrono::Utc::now)
        })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built values for common scenarios.

    use super::*;
    use std::sync::Arc;

    /// Tenant identifier from a literal known to be valid.
    pub fn tenant(name: &str) -> TenantId {
        TenantId::new(name).expect("fixture tenant id must be valid")
    }

    /// Entry key from a literal known to be valid.
    pub fn key(name: &str) -> EntryKey {
        EntryKey::new(name).expect("fixture key must be valid")
    }

    /// A JSON string document of exactly `len` bytes (`len >= 2`).
    pub fn json_of_len(len: usize) -> Vec<u8> {
        assert!(len >= 2, "a JSON string needs at least its quotes");
        let mut body = Vec::with_capacity(len);
        body.push(b'"');
        body.resize(len - 1, b'a');
        body.push(b'"');
        body
    }

    /// Policy with small ceilings and the given window.
    pub fn tight_policy(read_limit: u32, write_limit: u32, window: Duration) -> QuotaPolicy {
        QuotaPolicy {
            read_limit,
            write_limit,
            window,
        }
    }

    /// Fresh in-memory fast and durable layers.
    pub fn memory_stores() -> (Arc<MemoryFastStore>, Arc<MemoryDurableStore>) {
        (
            Arc::new(MemoryFastStore::new()),
            Arc::new(MemoryDurableStore::new()),
        )
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions on the Tessera error taxonomy.

    use super::*;

    pub fn assert_not_found<T: std::fmt::Debug>(result: &TesseraResult<T>) {
        assert!(
            matches!(result, Err(TesseraError::NotFound { .. })),
            "Expected NotFound, got {:?}",
            result
        );
    }

    pub fn assert_quota_exceeded<T: std::fmt::Debug>(
        result: &TesseraResult<T>,
        expected: ActionClass,
    ) {
        match result {
            Err(TesseraError::QuotaExceeded { action, .. }) => assert_eq!(
                *action, expected,
                "Quota rejection for wrong action class"
            ),
            other => panic!("Expected QuotaExceeded, got {:?}", other),
        }
    }

    pub fn assert_validation_error<T: std::fmt::Debug>(result: &TesseraResult<T>) {
        assert!(
            matches!(result, Err(TesseraError::Validation(_))),
            "Expected validation error, got {:?}",
            result
        );
    }

    pub fn assert_storage_error<T: std::fmt::Debug>(result: &TesseraResult<T>) {
        assert!(
            matches!(result, Err(TesseraError::Storage(_))),
            "Expected storage error, got {:?}",
            result
        );
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::generators::*;
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_json_of_len_is_exact_and_valid() {
        for len in [2, 3, 100, 4096] {
            let body = json_of_len(len);
            assert_eq!(body.len(), len);
            assert!(serde_json::from_slice::<serde_json::Value>(&body).is_ok());
        }
    }

    #[tokio::test]
    async fn test_flaky_durable_fails_only_selected_tenant() {
        let store = FlakyDurableStore::new();
        let now = chrono::Utc::now();
        store.fail_upserts_for(&tenant("bad"));

        assert!(store.upsert(&tenant("bad"), &key("k"), b"1", now).await.is_err());
        assert!(store.upsert(&tenant("good"), &key("k"), b"1", now).await.is_ok());
        assert_eq!(store.upsert_attempts(), 2);

        store.heal(&tenant("bad"));
        assert!(store.upsert(&tenant("bad"), &key("k"), b"1", now).await.is_ok());
    }

    #[tokio::test]
    async fn test_failing_fast_listing_only() {
        let store = FailingFastStore::new();
        store.fail_listing(true);
        store.put(&tenant("a"), &key("k"), b"1").await.unwrap();
        assert!(store.list_tenants().await.is_err());
        assert_eq!(store.list_keys(&tenant("a")).await.unwrap(), vec![key("k")]);
    }

    #[tokio::test]
    async fn test_flaky_durable_fails_only_selected_key() {
        let store = FlakyDurableStore::new();
        let now = chrono::Utc::now();
        store.fail_upserts_for_key(&tenant("a"), &key("bad"));

        assert!(store.upsert(&tenant("a"), &key("bad"), b"1", now).await.is_err());
        assert!(store.upsert(&tenant("a"), &key("ok"), b"1", now).await.is_ok());
        assert!(store.upsert(&tenant("b"), &key("bad"), b"1", now).await.is_ok());

        store.heal(&tenant("a"));
        assert!(store.upsert(&tenant("a"), &key("bad"), b"1", now).await.is_ok());
    }

    #[tokio::test]
    async fn test_failing_fast_single_read() {
        let store = FailingFastStore::new();
        store.put(&tenant("a"), &key("k1"), b"1").await.unwrap();
        store.put(&tenant("a"), &key("k2"), b"2").await.unwrap();
        store.fail_reads_for(&tenant("a"), &key("k1"));
        store.fail_key_listing_for(&tenant("b"));

        assert!(store.get(&tenant("a"), &key("k1")).await.is_err());
        assert_eq!(store.get(&tenant("a"), &key("k2")).await.unwrap(), Some(b"2".to_vec()));
        assert!(store.list_keys(&tenant("a")).await.is_ok());
        assert!(store.list_keys(&tenant("b")).await.is_err());
    }

    proptest! {
        #[test]
        fn prop_generated_payloads_parse(body in arb_json_payload()) {
            prop_assert!(serde_json::from_slice::<serde_json::Value>(&body).is_ok());
        }

        #[test]
        fn prop_malformed_payloads_do_not_parse(body in arb_malformed_payload()) {
            prop_assert!(serde_json::from_slice::<serde_json::Value>(&body).is_err());
        }
    }
}
