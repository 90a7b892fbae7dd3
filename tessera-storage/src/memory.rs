//! In-process store engines.
//!
//! These implement the same contracts as the Redis and PostgreSQL engines
//! and are what the test-suite runs against. Maps are ordered so tenant and
//! key enumeration is deterministic.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::RwLock;
use std::time::Duration;
use tokio::time::Instant;

use tessera_core::{
    ActionClass, DurableRow, EntryKey, StorageError, TenantId, TesseraResult, Timestamp,
};

use crate::traits::{DurableStore, FastStore, QuotaBackend};

type TenantMap<V> = BTreeMap<TenantId, BTreeMap<EntryKey, V>>;

// ============================================================================
// FAST LAYER
// ============================================================================

/// In-memory fast layer: one ordered map per tenant.
///
/// A tenant's map is dropped when its last key is removed, so a tenant with
/// zero keys is not enumerated.
#[derive(Debug, Default)]
pub struct MemoryFastStore {
    tenants: RwLock<TenantMap<Vec<u8>>>,
}

impl MemoryFastStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys held for a tenant.
    pub fn key_count(&self, tenant: &TenantId) -> usize {
        self.tenants
            .read()
            .map(|t| t.get(tenant).map_or(0, BTreeMap::len))
            .unwrap_or(0)
    }
}

#[async_trait]
impl FastStore for MemoryFastStore {
    async fn put(&self, tenant: &TenantId, key: &EntryKey, value: &[u8]) -> TesseraResult<()> {
        let mut tenants = self.tenants.write().map_err(|_| StorageError::LockPoisoned)?;
        tenants
            .entry(tenant.clone())
            .or_default()
            .insert(key.clone(), value.to_vec());
        Ok(())
    }

    async fn get(&self, tenant: &TenantId, key: &EntryKey) -> TesseraResult<Option<Vec<u8>>> {
        let tenants = self.tenants.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(tenants.get(tenant).and_then(|keys| keys.get(key)).cloned())
    }

    async fn remove(&self, tenant: &TenantId, key: &EntryKey) -> TesseraResult<bool> {
        let mut tenants = self.tenants.write().map_err(|_| StorageError::LockPoisoned)?;
        let Some(keys) = tenants.get_mut(tenant) else {
            return Ok(false);
        };
        let existed = keys.remove(key).is_some();
        if keys.is_empty() {
            tenants.remove(tenant);
        }
        Ok(existed)
    }

    async fn list_tenants(&self) -> TesseraResult<Vec<TenantId>> {
        let tenants = self.tenants.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(tenants.keys().cloned().collect())
    }

    async fn list_keys(&self, tenant: &TenantId) -> TesseraResult<Vec<EntryKey>> {
        let tenants = self.tenants.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(tenants
            .get(tenant)
            .map(|keys| keys.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn ping(&self) -> TesseraResult<()> {
        Ok(())
    }
}

// ============================================================================
// DURABLE LAYER
// ============================================================================

/// In-memory durable layer keyed by `(tenant, key)`.
#[derive(Debug, Default)]
pub struct MemoryDurableStore {
    rows: RwLock<TenantMap<(Vec<u8>, Timestamp)>>,
}

impl MemoryDurableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All rows of one tenant in key order.
    pub fn rows(&self, tenant: &TenantId) -> Vec<DurableRow> {
        let Ok(rows) = self.rows.read() else {
            return Vec::new();
        };
        rows.get(tenant)
            .map(|keys| {
                keys.iter()
                    .map(|(key, (value, updated_at))| DurableRow {
                        tenant: tenant.clone(),
                        key: key.clone(),
                        value: value.clone(),
                        updated_at: *updated_at,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Total number of rows across all tenants.
    pub fn row_count(&self) -> usize {
        self.rows
            .read()
            .map(|rows| rows.values().map(BTreeMap::len).sum())
            .unwrap_or(0)
    }
}

#[async_trait]
impl DurableStore for MemoryDurableStore {
    async fn upsert(
        &self,
        tenant: &TenantId,
        key: &EntryKey,
        value: &[u8],
        updated_at: Timestamp,
    ) -> TesseraResult<()> {
        let mut rows = self.rows.write().map_err(|_| StorageError::LockPoisoned)?;
        rows.entry(tenant.clone())
            .or_default()
            .insert(key.clone(), (value.to_vec(), updated_at));
        Ok(())
    }

    async fn delete(&self, tenant: &TenantId, key: &EntryKey) -> TesseraResult<bool> {
        let mut rows = self.rows.write().map_err(|_| StorageError::LockPoisoned)?;
        let Some(keys) = rows.get_mut(tenant) else {
            return Ok(false);
        };
        let existed = keys.remove(key).is_some();
        if keys.is_empty() {
            rows.remove(tenant);
        }
        Ok(existed)
    }

    async fn footprint(&self, tenant: &TenantId) -> TesseraResult<u64> {
        let rows = self.rows.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(rows
            .get(tenant)
            .map(|keys| keys.values().map(|(value, _)| value.len() as u64).sum())
            .unwrap_or(0))
    }

    async fn oldest(&self, tenant: &TenantId) -> TesseraResult<Option<(EntryKey, Timestamp)>> {
        let rows = self.rows.read().map_err(|_| StorageError::LockPoisoned)?;
        // Keys iterate in order, so min_by_key keeps the first key on ties.
        Ok(rows.get(tenant).and_then(|keys| {
            keys.iter()
                .min_by_key(|(_, (_, updated_at))| *updated_at)
                .map(|(key, (_, updated_at))| (key.clone(), *updated_at))
        }))
    }

    async fn get(
        &self,
        tenant: &TenantId,
        key: &EntryKey,
    ) -> TesseraResult<Option<(Vec<u8>, Timestamp)>> {
        let rows = self.rows.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(rows.get(tenant).and_then(|keys| keys.get(key)).cloned())
    }

    async fn ping(&self) -> TesseraResult<()> {
        Ok(())
    }
}

// ============================================================================
// QUOTA COUNTERS
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct WindowCounter {
    window_start: Instant,
    count: u32,
}

/// In-process fixed-window counters.
///
/// Expiry is an explicit `window_start + window` comparison against a
/// monotonic clock. The check and the increment happen while holding the
/// DashMap shard lock for the counter's entry, so they form one atomic step.
#[derive(Debug, Default)]
pub struct WindowCounters {
    counters: DashMap<(TenantId, ActionClass), WindowCounter>,
}

impl WindowCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live counters.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    fn acquire_at(
        &self,
        tenant: &TenantId,
        action: ActionClass,
        limit: u32,
        window: Duration,
        now: Instant,
    ) -> bool {
        let mut counter = self
            .counters
            .entry((tenant.clone(), action))
            .or_insert(WindowCounter {
                window_start: now,
                count: 0,
            });

        if now.duration_since(counter.window_start) >= window {
            counter.window_start = now;
            counter.count = 0;
        }

        if counter.count >= limit {
            return false;
        }
        counter.count += 1;
        true
    }
}

#[async_trait]
impl QuotaBackend for WindowCounters {
    async fn try_acquire(
        &self,
        tenant: &TenantId,
        action: ActionClass,
        limit: u32,
        window: Duration,
    ) -> TesseraResult<bool> {
        Ok(self.acquire_at(tenant, action, limit, window, Instant::now()))
    }

    async fn prune_expired(&self, window: Duration) -> TesseraResult<usize> {
        let now = Instant::now();
        let before = self.counters.len();
        self.counters
            .retain(|_, counter| now.duration_since(counter.window_start) < window);
        Ok(before.saturating_sub(self.counters.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn tenant(name: &str) -> TenantId {
        TenantId::new(name).unwrap()
    }

    fn key(name: &str) -> EntryKey {
        EntryKey::new(name).unwrap()
    }

    fn at(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[tokio::test]
    async fn test_fast_put_get_remove() {
        let store = MemoryFastStore::new();
        let t = tenant("acme");

        store.put(&t, &key("cfg1"), br#"{"x":1}"#).await.unwrap();
        assert_eq!(
            store.get(&t, &key("cfg1")).await.unwrap(),
            Some(br#"{"x":1}"#.to_vec())
        );

        assert!(store.remove(&t, &key("cfg1")).await.unwrap());
        assert!(!store.remove(&t, &key("cfg1")).await.unwrap());
        assert_eq!(store.get(&t, &key("cfg1")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_fast_empty_tenant_not_enumerated() {
        let store = MemoryFastStore::new();
        let t = tenant("acme");
        store.put(&t, &key("a"), b"1").await.unwrap();
        assert_eq!(store.list_tenants().await.unwrap(), vec![t.clone()]);

        store.remove(&t, &key("a")).await.unwrap();
        assert!(store.list_tenants().await.unwrap().is_empty());
        assert!(store.list_keys(&t).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fast_tenants_are_isolated() {
        let store = MemoryFastStore::new();
        store.put(&tenant("a"), &key("k"), b"1").await.unwrap();
        store.put(&tenant("b"), &key("k"), b"2").await.unwrap();

        store.remove(&tenant("a"), &key("k")).await.unwrap();
        assert_eq!(
            store.get(&tenant("b"), &key("k")).await.unwrap(),
            Some(b"2".to_vec())
        );
    }

    #[tokio::test]
    async fn test_durable_footprint_and_oldest() {
        let store = MemoryDurableStore::new();
        let t = tenant("acme");

        store.upsert(&t, &key("b"), b"12345", at(10)).await.unwrap();
        store.upsert(&t, &key("a"), b"123", at(20)).await.unwrap();
        store.upsert(&tenant("other"), &key("z"), b"1", at(0)).await.unwrap();

        assert_eq!(store.footprint(&t).await.unwrap(), 8);
        assert_eq!(
            store.oldest(&t).await.unwrap(),
            Some((key("b"), at(10)))
        );
    }

    #[tokio::test]
    async fn test_durable_oldest_tie_breaks_by_key() {
        let store = MemoryDurableStore::new();
        let t = tenant("acme");
        store.upsert(&t, &key("m"), b"1", at(5)).await.unwrap();
        store.upsert(&t, &key("c"), b"1", at(5)).await.unwrap();
        store.upsert(&t, &key("x"), b"1", at(5)).await.unwrap();

        assert_eq!(store.oldest(&t).await.unwrap(), Some((key("c"), at(5))));
    }

    #[tokio::test]
    async fn test_durable_oldest_tie_break_is_byte_order() {
        let store = MemoryDurableStore::new();
        let t = tenant("acme");
        store.upsert(&t, &key("a"), b"1", at(5)).await.unwrap();
        store.upsert(&t, &key("B"), b"1", at(5)).await.unwrap();

        assert_eq!(store.oldest(&t).await.unwrap(), Some((key("B"), at(5))));
    }

    #[tokio::test]
    async fn test_durable_upsert_overwrites() {
        let store = MemoryDurableStore::new();
        let t = tenant("acme");
        store.upsert(&t, &key("k"), b"old-value", at(1)).await.unwrap();
        store.upsert(&t, &key("k"), b"new", at(2)).await.unwrap();

        assert_eq!(
            store.get(&t, &key("k")).await.unwrap(),
            Some((b"new".to_vec(), at(2)))
        );
        assert_eq!(store.footprint(&t).await.unwrap(), 3);
        assert_eq!(store.row_count(), 1);
    }

    #[tokio::test]
    async fn test_durable_empty_tenant() {
        let store = MemoryDurableStore::new();
        let t = tenant("ghost");
        assert_eq!(store.footprint(&t).await.unwrap(), 0);
        assert_eq!(store.oldest(&t).await.unwrap(), None);
        assert!(!store.delete(&t, &key("k")).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_counter_ceiling_and_reset() {
        let counters = WindowCounters::new();
        let t = tenant("acme");
        let window = Duration::from_secs(60);

        for _ in 0..3 {
            assert!(counters.try_acquire(&t, ActionClass::Write, 3, window).await.unwrap());
        }
        assert!(!counters.try_acquire(&t, ActionClass::Write, 3, window).await.unwrap());

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(!counters.try_acquire(&t, ActionClass::Write, 3, window).await.unwrap());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(counters.try_acquire(&t, ActionClass::Write, 3, window).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_counters_are_per_action() {
        let counters = WindowCounters::new();
        let t = tenant("acme");
        let window = Duration::from_secs(60);

        assert!(counters.try_acquire(&t, ActionClass::Write, 1, window).await.unwrap());
        assert!(!counters.try_acquire(&t, ActionClass::Write, 1, window).await.unwrap());
        assert!(counters.try_acquire(&t, ActionClass::Read, 1, window).await.unwrap());
        assert!(counters.try_acquire(&tenant("other"), ActionClass::Write, 1, window).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_expired() {
        let counters = WindowCounters::new();
        let window = Duration::from_secs(60);
        counters.try_acquire(&tenant("a"), ActionClass::Read, 5, window).await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        counters.try_acquire(&tenant("b"), ActionClass::Read, 5, window).await.unwrap();
        tokio::time::advance(Duration::from_secs(31)).await;

        assert_eq!(counters.prune_expired(window).await.unwrap(), 1);
        assert_eq!(counters.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_window_counter_atomic_under_contention() {
        let counters = Arc::new(WindowCounters::new());
        let window = Duration::from_secs(3600);
        let mut handles = Vec::new();

        for _ in 0..16 {
            let counters = Arc::clone(&counters);
            handles.push(tokio::spawn(async move {
                let t = TenantId::new("hot").unwrap();
                let mut granted = 0u32;
                for _ in 0..50 {
                    if counters
                        .try_acquire(&t, ActionClass::Write, 100, window)
                        .await
                        .unwrap()
                    {
                        granted += 1;
                    }
                }
                granted
            }));
        }

        let mut total = 0;
        for handle in handles {
            total += handle.await.unwrap();
        }
        assert_eq!(total, 100);
    }
}
