//! End-to-end scenarios through the service façade, the limiter and the sync
//! engine over in-memory stores.

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use tokio::sync::watch;

use tessera_api::{sync_task, KvService, QuotaLimiter, SyncConfig, SyncEngine};
use tessera_test_utils::assertions::{
    assert_not_found, assert_quota_exceeded, assert_storage_error, assert_validation_error,
};
use tessera_test_utils::fixtures::{json_of_len, key, memory_stores, tenant, tight_policy};
use tessera_test_utils::generators::{arb_entry_key, arb_json_payload, arb_tenant_id};
use tessera_test_utils::{
    ActionClass, DurableStore, FailingFastStore, FastStore, FlakyDurableStore,
    MemoryDurableStore, MemoryFastStore, QuotaPolicy, UnreachableQuotaBackend,
    MAX_PAYLOAD_BYTES,
};

fn service(policy: QuotaPolicy) -> (KvService, Arc<MemoryFastStore>, Arc<MemoryDurableStore>) {
    let (fast, durable) = memory_stores();
    let svc = KvService::new(fast.clone(), durable.clone(), QuotaLimiter::in_memory(policy));
    (svc, fast, durable)
}

#[tokio::test]
async fn test_write_read_sync_delete_lifecycle() {
    let (svc, fast, durable) = service(QuotaPolicy::default());
    let (t, k) = (tenant("acme"), key("cfg1"));

    svc.put(&t, &k, br#"{"x":1}"#.to_vec()).await.unwrap();
    assert_eq!(svc.get(&t, &k).await.unwrap(), br#"{"x":1}"#.to_vec());
    assert_eq!(durable.row_count(), 0);

    let engine = SyncEngine::new(fast.clone(), durable.clone(), 1024);
    let (_tx, rx) = watch::channel(false);
    let report = engine.run_cycle(&rx).await;
    assert_eq!(report.keys_synced, 1);
    let (value, _) = durable.get(&t, &k).await.unwrap().unwrap();
    assert_eq!(value, br#"{"x":1}"#.to_vec());

    svc.delete(&t, &k).await.unwrap();
    assert_not_found(&svc.get(&t, &k).await);
    assert_eq!(durable.row_count(), 0);
    assert_eq!(fast.key_count(&t), 0);
}

#[tokio::test]
async fn test_overwrite_returns_latest_value() {
    let (svc, _, _) = service(QuotaPolicy::default());
    let (t, k) = (tenant("acme"), key("cfg1"));
    svc.put(&t, &k, b"1".to_vec()).await.unwrap();
    svc.put(&t, &k, b"2".to_vec()).await.unwrap();
    assert_eq!(svc.get(&t, &k).await.unwrap(), b"2".to_vec());
}

#[tokio::test]
async fn test_tenants_are_isolated() {
    let (svc, _, _) = service(QuotaPolicy::default());
    let k = key("shared");
    svc.put(&tenant("a"), &k, b"\"a\"".to_vec()).await.unwrap();
    svc.put(&tenant("b"), &k, b"\"b\"".to_vec()).await.unwrap();

    assert_eq!(svc.get(&tenant("a"), &k).await.unwrap(), b"\"a\"".to_vec());
    svc.delete(&tenant("a"), &k).await.unwrap();
    assert_eq!(svc.get(&tenant("b"), &k).await.unwrap(), b"\"b\"".to_vec());
}

#[tokio::test(start_paused = true)]
async fn test_write_ceiling_resets_after_window() {
    let (svc, _, _) = service(tight_policy(100, 3, Duration::from_secs(60)));
    let (t, k) = (tenant("acme"), key("cfg1"));

    for _ in 0..3 {
        svc.put(&t, &k, b"1".to_vec()).await.unwrap();
    }
    assert_quota_exceeded(&svc.put(&t, &k, b"1".to_vec()).await, ActionClass::Write);
    // A delete is a write too.
    assert_quota_exceeded(&svc.delete(&t, &k).await, ActionClass::Write);

    tokio::time::advance(Duration::from_secs(61)).await;
    svc.put(&t, &k, b"1".to_vec()).await.unwrap();
}

#[tokio::test]
async fn test_validation_precedes_quota() {
    let (svc, _, _) = service(tight_policy(100, 1, Duration::from_secs(60)));
    let (t, k) = (tenant("acme"), key("cfg1"));

    assert_validation_error(&svc.put(&t, &k, json_of_len(MAX_PAYLOAD_BYTES + 1)).await);
    assert_validation_error(&svc.put(&t, &k, b"{oops".to_vec()).await);
    svc.put(&t, &k, json_of_len(MAX_PAYLOAD_BYTES)).await.unwrap();
}

#[tokio::test]
async fn test_unreachable_counters_fail_closed() {
    let (fast, durable) = memory_stores();
    let limiter = QuotaLimiter::new(Arc::new(UnreachableQuotaBackend), QuotaPolicy::default());
    let svc = KvService::new(fast.clone(), durable, limiter);
    let (t, k) = (tenant("acme"), key("cfg1"));

    assert_quota_exceeded(&svc.put(&t, &k, b"1".to_vec()).await, ActionClass::Write);
    assert_quota_exceeded(&svc.get(&t, &k).await, ActionClass::Read);
    assert_eq!(fast.key_count(&t), 0);
}

#[tokio::test]
async fn test_fast_layer_outage_surfaces_storage_error() {
    let fast = Arc::new(FailingFastStore::new());
    let svc = KvService::new(
        fast.clone(),
        Arc::new(MemoryDurableStore::new()),
        QuotaLimiter::in_memory(QuotaPolicy::default()),
    );
    let (t, k) = (tenant("acme"), key("cfg1"));
    svc.put(&t, &k, b"1".to_vec()).await.unwrap();

    fast.set_down(true);
    assert_storage_error(&svc.get(&t, &k).await);
    assert_storage_error(&svc.put(&t, &k, b"2".to_vec()).await);

    fast.set_down(false);
    assert_eq!(svc.get(&t, &k).await.unwrap(), b"1".to_vec());
}

#[tokio::test]
async fn test_durable_delete_failure_is_reported() {
    let fast = Arc::new(MemoryFastStore::new());
    let durable = Arc::new(FlakyDurableStore::new());
    let svc = KvService::new(
        fast.clone(),
        durable.clone(),
        QuotaLimiter::in_memory(QuotaPolicy::default()),
    );
    let (t, k) = (tenant("acme"), key("cfg1"));
    svc.put(&t, &k, b"1".to_vec()).await.unwrap();
    durable.upsert(&t, &k, b"1", chrono::Utc::now()).await.unwrap();
    durable.fail_deletes(true);

    assert_storage_error(&svc.delete(&t, &k).await);
    // The fast-layer removal is not rolled back.
    assert_eq!(fast.get(&t, &k).await.unwrap(), None);
    assert_eq!(durable.inner().row_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_background_task_syncs_and_stops() {
    let (svc, fast, durable) = service(QuotaPolicy::default());
    let engine = Arc::new(SyncEngine::new(fast, durable.clone(), 1024));
    let config = SyncConfig {
        interval: Duration::from_secs(10),
        tenant_cap_bytes: 1024,
        quota_prune_interval: Duration::from_secs(60),
    };
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(sync_task(engine, svc.limiter().clone(), config, rx));

    svc.put(&tenant("acme"), &key("cfg1"), b"1".to_vec()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(durable.row_count(), 1);

    tx.send(true).unwrap();
    let metrics = handle.await.unwrap();
    assert_eq!(metrics.snapshot().cycles, 1);
}

#[tokio::test(start_paused = true)]
async fn test_background_task_prunes_quota_counters() {
    let (svc, fast, durable) = service(tight_policy(100, 100, Duration::from_secs(5)));
    let engine = Arc::new(SyncEngine::new(fast, durable, 1024));
    let config = SyncConfig {
        interval: Duration::from_secs(10),
        tenant_cap_bytes: 1024,
        quota_prune_interval: Duration::from_secs(30),
    };
    svc.put(&tenant("a"), &key("k"), b"1".to_vec()).await.unwrap();
    svc.put(&tenant("b"), &key("k"), b"1".to_vec()).await.unwrap();

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(sync_task(engine, svc.limiter().clone(), config, rx));

    tokio::time::sleep(Duration::from_secs(31)).await;
    tx.send(true).unwrap();
    let metrics = handle.await.unwrap();
    assert_eq!(metrics.snapshot().quota_counters_pruned, 2);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_accepted_payload_reads_back_verbatim(
        t in arb_tenant_id(),
        k in arb_entry_key(),
        body in arb_json_payload(),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            let (svc, fast, _) = service(QuotaPolicy::default());
            svc.put(&t, &k, body.clone()).await.unwrap();
            prop_assert_eq!(svc.get(&t, &k).await.unwrap(), body.clone());
            prop_assert_eq!(fast.get(&t, &k).await.unwrap(), Some(body));
            Ok(())
        })?;
    }
}
