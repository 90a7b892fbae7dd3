//! Engine tests against live Redis and PostgreSQL instances.
//!
//! Run with `cargo test -p tessera-storage --features store-tests`.
//! Endpoints come from `TESSERA_TEST_REDIS_URL` and `TESSERA_TEST_DATABASE_URL`.

#![cfg(feature = "store-tests")]

use chrono::{Duration as ChronoDuration, Utc};
use std::time::Duration;
use tessera_core::{ActionClass, EntryKey, TenantId};
use tessera_storage::{
    DurableStore, FastStore, PgConfig, PgDurableStore, QuotaBackend, RedisFastStore,
    RedisQuotaBackend,
};

fn redis_url() -> String {
    std::env::var("TESSERA_TEST_REDIS_URL").unwrap_or_else(|_| "127.0.0.1:6379".to_string())
}

fn pg_config() -> PgConfig {
    PgConfig {
        url: std::env::var("TESSERA_TEST_DATABASE_URL")
            .unwrap_or_else(|_| "postgres://postgres@localhost:5432/tessera_test".to_string()),
        max_size: 4,
        timeout: Duration::from_secs(5),
    }
}

/// Tenant names unique to one test run so parallel runs do not collide.
fn unique_tenant(label: &str) -> TenantId {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    TenantId::new(format!("{}-{}", label, nanos)).unwrap()
}

fn key(name: &str) -> EntryKey {
    EntryKey::new(name).unwrap()
}

#[tokio::test]
async fn redis_fast_store_roundtrip() {
    let store = RedisFastStore::connect(&redis_url()).await.unwrap();
    let tenant = unique_tenant("live-fast");

    store.put(&tenant, &key("cfg1"), br#"{"x":1}"#).await.unwrap();
    store.put(&tenant, &key("cfg2"), b"2").await.unwrap();

    assert_eq!(
        store.get(&tenant, &key("cfg1")).await.unwrap(),
        Some(br#"{"x":1}"#.to_vec())
    );
    assert_eq!(
        store.list_keys(&tenant).await.unwrap(),
        vec![key("cfg1"), key("cfg2")]
    );
    assert!(store.list_tenants().await.unwrap().contains(&tenant));

    assert!(store.remove(&tenant, &key("cfg1")).await.unwrap());
    assert!(!store.remove(&tenant, &key("cfg1")).await.unwrap());
    assert!(store.remove(&tenant, &key("cfg2")).await.unwrap());
    assert!(!store.list_tenants().await.unwrap().contains(&tenant));
}

#[tokio::test]
async fn redis_quota_backend_enforces_ceiling() {
    let backend = RedisQuotaBackend::connect(&redis_url()).await.unwrap();
    let tenant = unique_tenant("live-quota");
    let window = Duration::from_secs(60);

    for _ in 0..5 {
        assert!(backend
            .try_acquire(&tenant, ActionClass::Write, 5, window)
            .await
            .unwrap());
    }
    assert!(!backend
        .try_acquire(&tenant, ActionClass::Write, 5, window)
        .await
        .unwrap());
    assert!(backend
        .try_acquire(&tenant, ActionClass::Read, 5, window)
        .await
        .unwrap());
}

#[tokio::test]
async fn redis_quota_window_expires() {
    let backend = RedisQuotaBackend::connect(&redis_url()).await.unwrap();
    let tenant = unique_tenant("live-expiry");
    let window = Duration::from_millis(200);

    assert!(backend.try_acquire(&tenant, ActionClass::Write, 1, window).await.unwrap());
    assert!(!backend.try_acquire(&tenant, ActionClass::Write, 1, window).await.unwrap());

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(backend.try_acquire(&tenant, ActionClass::Write, 1, window).await.unwrap());
}

#[tokio::test]
async fn postgres_durable_store_contract() {
    let store = PgDurableStore::connect(&pg_config()).await.unwrap();
    store.ensure_schema().await.unwrap();
    let tenant = unique_tenant("live-durable");
    let now = Utc::now();

    store
        .upsert(&tenant, &key("b"), b"12345", now - ChronoDuration::seconds(30))
        .await
        .unwrap();
    store
        .upsert(&tenant, &key("a"), b"123", now)
        .await
        .unwrap();

    assert_eq!(store.footprint(&tenant).await.unwrap(), 8);
    let (oldest, _) = store.oldest(&tenant).await.unwrap().unwrap();
    assert_eq!(oldest, key("b"));

    store.upsert(&tenant, &key("b"), b"1", now).await.unwrap();
    assert_eq!(store.footprint(&tenant).await.unwrap(), 4);
    let (value, _) = store.get(&tenant, &key("b")).await.unwrap().unwrap();
    assert_eq!(value, b"1".to_vec());

    assert!(store.delete(&tenant, &key("a")).await.unwrap());
    assert!(store.delete(&tenant, &key("b")).await.unwrap());
    assert!(!store.delete(&tenant, &key("b")).await.unwrap());
    assert_eq!(store.footprint(&tenant).await.unwrap(), 0);
    assert_eq!(store.oldest(&tenant).await.unwrap(), None);
}

#[tokio::test]
async fn postgres_oldest_tie_break_is_byte_order() {
    let store = PgDurableStore::connect(&pg_config()).await.unwrap();
    store.ensure_schema().await.unwrap();
    let tenant = unique_tenant("live-tie");
    let now = Utc::now();

    store.upsert(&tenant, &key("a"), b"1", now).await.unwrap();
    store.upsert(&tenant, &key("B"), b"1", now).await.unwrap();

    let (oldest, _) = store.oldest(&tenant).await.unwrap().unwrap();
    assert_eq!(oldest, key("B"));

    store.delete(&tenant, &key("a")).await.unwrap();
    store.delete(&tenant, &key("B")).await.unwrap();
}
