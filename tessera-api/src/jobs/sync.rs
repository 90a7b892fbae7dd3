//! Sync and Eviction Background Task
//!
//! Every period the engine copies the fast layer into the durable layer and
//! keeps each tenant's durable footprint under its cap:
//!
//! 1. Enumerate tenants from the fast layer's tenant namespaces
//! 2. For every key of a tenant, read the value and upsert it into the
//!    durable layer with the current wall-clock time
//! 3. After each key, recompute the tenant's durable footprint
//! 4. If the footprint exceeds the cap, evict the single oldest row: durable
//!    delete first, then fast-layer removal
//!
//! Failures are logged and counted, never propagated. An enumeration failure
//! skips the cycle; a failure on one key or tenant does not stop the others.
//!
//! # Configuration
//!
//! ```rust
//! use tessera_api::jobs::SyncConfig;
//! use std::time::Duration;
//!
//! let config = SyncConfig {
//!     interval: Duration::from_secs(10),             // Sync every 10 seconds
//!     tenant_cap_bytes: 100 * 1024 * 1024,           // 100 MiB per tenant
//!     quota_prune_interval: Duration::from_secs(60), // Drop stale quota counters
//! };
//! ```

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};
use tokio::time::{interval_at, MissedTickBehavior};

use tessera_core::{EntryKey, TenantId, DEFAULT_SYNC_INTERVAL_SECS, DEFAULT_TENANT_CAP_BYTES};
use tessera_storage::{DurableStore, FastStore};

use crate::config::env_or;
use crate::constants::DEFAULT_QUOTA_PRUNE_INTERVAL_SECS;
use crate::quota::QuotaLimiter;
use crate::telemetry::METRICS;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the sync background task.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Period between cycles (default: 10 seconds)
    pub interval: Duration,

    /// Per-tenant durable footprint cap in bytes (default: 100 MiB)
    pub tenant_cap_bytes: u64,

    /// How often to drop expired quota counters (default: 60 seconds)
    pub quota_prune_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS),
            tenant_cap_bytes: DEFAULT_TENANT_CAP_BYTES,
            quota_prune_interval: Duration::from_secs(DEFAULT_QUOTA_PRUNE_INTERVAL_SECS),
        }
    }
}

impl SyncConfig {
    /// Create SyncConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `TESSERA_SYNC_INTERVAL_SECS`: Period between cycles (default: 10)
    /// - `TESSERA_TENANT_CAP_BYTES`: Per-tenant footprint cap (default: 104857600)
    /// - `TESSERA_QUOTA_PRUNE_INTERVAL_SECS`: Quota counter pruning period (default: 60)
    pub fn from_env() -> Self {
        Self {
            interval: Duration::from_secs(env_or(
                "TESSERA_SYNC_INTERVAL_SECS",
                DEFAULT_SYNC_INTERVAL_SECS,
            )),
            tenant_cap_bytes: env_or("TESSERA_TENANT_CAP_BYTES", DEFAULT_TENANT_CAP_BYTES),
            quota_prune_interval: Duration::from_secs(env_or(
                "TESSERA_QUOTA_PRUNE_INTERVAL_SECS",
                DEFAULT_QUOTA_PRUNE_INTERVAL_SECS,
            )),
        }
    }
}

// ============================================================================
// METRICS
// ============================================================================

/// Lifetime counters for the sync task.
#[derive(Debug, Default)]
pub struct SyncMetrics {
    /// Cycles that ran to completion or cancellation
    pub cycles: AtomicU64,

    /// Cycles skipped because tenants could not be enumerated
    pub skipped_cycles: AtomicU64,

    /// Keys copied into the durable layer
    pub keys_synced: AtomicU64,

    /// Per-key or per-tenant failures (read, upsert, footprint)
    pub sync_failures: AtomicU64,

    /// Rows evicted from both layers
    pub evictions: AtomicU64,

    /// Evictions that could not be completed
    pub eviction_failures: AtomicU64,

    /// Expired quota counters dropped
    pub quota_counters_pruned: AtomicU64,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one cycle's report into the lifetime counters.
    pub fn record(&self, report: &CycleReport) {
        if report.enumeration_failed {
            self.skipped_cycles.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.keys_synced.fetch_add(report.keys_synced, Ordering::Relaxed);
        self.sync_failures.fetch_add(
            report.read_failures + report.upsert_failures + report.footprint_failures,
            Ordering::Relaxed,
        );
        self.evictions.fetch_add(report.evictions, Ordering::Relaxed);
        self.eviction_failures
            .fetch_add(report.eviction_failures, Ordering::Relaxed);
    }

    /// Get current snapshot of all metrics.
    pub fn snapshot(&self) -> SyncSnapshot {
        SyncSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            skipped_cycles: self.skipped_cycles.load(Ordering::Relaxed),
            keys_synced: self.keys_synced.load(Ordering::Relaxed),
            sync_failures: self.sync_failures.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            eviction_failures: self.eviction_failures.load(Ordering::Relaxed),
            quota_counters_pruned: self.quota_counters_pruned.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of sync metrics at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSnapshot {
    pub cycles: u64,
    pub skipped_cycles: u64,
    pub keys_synced: u64,
    pub sync_failures: u64,
    pub evictions: u64,
    pub eviction_failures: u64,
    pub quota_counters_pruned: u64,
}

// ============================================================================
// ENGINE
// ============================================================================

/// Outcome of one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Tenants visited
    pub tenants: usize,
    /// Keys upserted into the durable layer
    pub keys_synced: u64,
    /// Keys whose upsert failed
    pub upsert_failures: u64,
    /// Key listings or value reads that failed
    pub read_failures: u64,
    /// Footprint computations that failed
    pub footprint_failures: u64,
    /// Rows evicted from both layers
    pub evictions: u64,
    /// Evictions that failed at any step
    pub eviction_failures: u64,
    /// Tenant enumeration failed; nothing else was attempted
    pub enumeration_failed: bool,
    /// Shutdown was observed before the sweep finished
    pub cancelled: bool,
}

impl CycleReport {
    /// Whether the cycle did anything worth an info-level log line.
    pub fn is_eventful(&self) -> bool {
        self.keys_synced > 0 || self.evictions > 0 || self.has_failures()
    }

    pub fn has_failures(&self) -> bool {
        self.enumeration_failed
            || self.upsert_failures > 0
            || self.read_failures > 0
            || self.footprint_failures > 0
            || self.eviction_failures > 0
    }
}

/// Copies the fast layer into the durable layer and enforces the footprint
/// cap. Only ever sees the store capability traits.
pub struct SyncEngine {
    fast: Arc<dyn FastStore>,
    durable: Arc<dyn DurableStore>,
    tenant_cap_bytes: u64,
    cycle_lock: Mutex<()>,
}

impl SyncEngine {
    pub fn new(
        fast: Arc<dyn FastStore>,
        durable: Arc<dyn DurableStore>,
        tenant_cap_bytes: u64,
    ) -> Self {
        Self {
            fast,
            durable,
            tenant_cap_bytes,
            cycle_lock: Mutex::new(()),
        }
    }

    /// Run one full cycle.
    ///
    /// Cycles are serialised: a second caller waits for the running cycle to
    /// finish. `shutdown` is checked before every tenant and every key; once
    /// it reads `true` the sweep stops and the report is marked cancelled.
    pub async fn run_cycle(&self, shutdown: &watch::Receiver<bool>) -> CycleReport {
        let _guard = self.cycle_lock.lock().await;
        let mut report = CycleReport::default();

        let tenants = match self.fast.list_tenants().await {
            Ok(tenants) => tenants,
            Err(e) => {
                tracing::error!(error = %e, "Failed to enumerate tenants, skipping cycle");
                report.enumeration_failed = true;
                return report;
            }
        };

        for tenant in &tenants {
            if *shutdown.borrow() {
                report.cancelled = true;
                break;
            }
            report.tenants += 1;
            self.sync_tenant(tenant, shutdown, &mut report).await;
            if report.cancelled {
                break;
            }
        }

        report
    }

    async fn sync_tenant(
        &self,
        tenant: &TenantId,
        shutdown: &watch::Receiver<bool>,
        report: &mut CycleReport,
    ) {
        let keys = match self.fast.list_keys(tenant).await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(tenant = %tenant, error = %e, "Failed to list keys");
                report.read_failures += 1;
                return;
            }
        };

        for key in &keys {
            if *shutdown.borrow() {
                report.cancelled = true;
                return;
            }

            let value = match self.fast.get(tenant, key).await {
                Ok(Some(value)) => value,
                // Deleted or evicted since the listing.
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(tenant = %tenant, key = %key, error = %e, "Failed to read value");
                    report.read_failures += 1;
                    continue;
                }
            };

            match self.durable.upsert(tenant, key, &value, Utc::now()).await {
                Ok(()) => report.keys_synced += 1,
                Err(e) => {
                    tracing::warn!(tenant = %tenant, key = %key, error = %e, "Failed to upsert");
                    report.upsert_failures += 1;
                }
            }

            self.enforce_cap(tenant, report).await;
        }
    }

    /// Evict at most one row if the tenant is over its cap.
    async fn enforce_cap(&self, tenant: &TenantId, report: &mut CycleReport) {
        let footprint = match self.durable.footprint(tenant).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(tenant = %tenant, error = %e, "Failed to compute footprint");
                report.footprint_failures += 1;
                return;
            }
        };

        if footprint <= self.tenant_cap_bytes {
            return;
        }

        let victim = match self.durable.oldest(tenant).await {
            Ok(Some((key, _))) => key,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(tenant = %tenant, error = %e, "Failed to find oldest entry");
                report.eviction_failures += 1;
                return;
            }
        };

        if self.evict(tenant, &victim).await {
            tracing::info!(
                tenant = %tenant,
                key = %victim,
                footprint,
                cap = self.tenant_cap_bytes,
                "Evicted oldest entry"
            );
            report.evictions += 1;
        } else {
            report.eviction_failures += 1;
        }
    }

    /// Durable delete, then fast-layer removal. Both are attempted; either
    /// failure is logged and the durable row is re-evaluated next cycle.
    async fn evict(&self, tenant: &TenantId, key: &EntryKey) -> bool {
        let mut evicted = true;
        if let Err(e) = self.durable.delete(tenant, key).await {
            tracing::error!(tenant = %tenant, key = %key, error = %e, "Eviction: durable delete failed");
            evicted = false;
        }
        if let Err(e) = self.fast.remove(tenant, key).await {
            tracing::error!(tenant = %tenant, key = %key, error = %e, "Eviction: fast-layer removal failed");
            evicted = false;
        }
        evicted
    }
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Background task that runs the sync engine on a fixed period.
///
/// The first cycle fires one full period after start. A second, slower timer
/// prunes expired quota counters. The task runs until the shutdown signal
/// reads `true` (or its sender is dropped) and returns the metrics collected
/// over its lifetime.
///
/// # Example
///
/// ```ignore
/// let (shutdown_tx, shutdown_rx) = watch::channel(false);
/// let handle = tokio::spawn(sync_task(engine, limiter, SyncConfig::default(), shutdown_rx));
///
/// // Later, trigger shutdown
/// let _ = shutdown_tx.send(true);
/// let metrics = handle.await?;
/// ```
pub async fn sync_task(
    engine: Arc<SyncEngine>,
    limiter: QuotaLimiter,
    config: SyncConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<SyncMetrics> {
    let metrics = Arc::new(SyncMetrics::new());

    let start = tokio::time::Instant::now();
    let mut sync_interval = interval_at(start + config.interval, config.interval);
    sync_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut prune_interval = interval_at(
        start + config.quota_prune_interval,
        config.quota_prune_interval,
    );
    prune_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        interval_secs = config.interval.as_secs(),
        tenant_cap_bytes = config.tenant_cap_bytes,
        "Sync task started"
    );

    if !*shutdown_rx.borrow() {
        loop {
            tokio::select! {
                // Check for shutdown signal
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        tracing::info!("Sync task shutting down");
                        break;
                    }
                }

                // Regular sync cycle
                _ = sync_interval.tick() => {
                    run_and_record(&engine, &shutdown_rx, &metrics).await;
                }

                // Quota counter pruning
                _ = prune_interval.tick() => {
                    let removed = limiter.prune().await;
                    if removed > 0 {
                        tracing::debug!(removed, "Pruned expired quota counters");
                        metrics
                            .quota_counters_pruned
                            .fetch_add(removed as u64, Ordering::Relaxed);
                    }
                }
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        cycles = snapshot.cycles,
        skipped_cycles = snapshot.skipped_cycles,
        keys_synced = snapshot.keys_synced,
        sync_failures = snapshot.sync_failures,
        evictions = snapshot.evictions,
        eviction_failures = snapshot.eviction_failures,
        "Sync task completed"
    );

    metrics
}

async fn run_and_record(
    engine: &SyncEngine,
    shutdown_rx: &watch::Receiver<bool>,
    metrics: &SyncMetrics,
) {
    let started = Instant::now();
    let report = engine.run_cycle(shutdown_rx).await;
    let elapsed = started.elapsed();

    metrics.record(&report);
    if let Ok(prom) = METRICS.as_ref() {
        prom.record_sync_cycle(&report, elapsed.as_secs_f64());
    }

    if report.is_eventful() {
        tracing::info!(
            tenants = report.tenants,
            keys_synced = report.keys_synced,
            upsert_failures = report.upsert_failures,
            read_failures = report.read_failures,
            footprint_failures = report.footprint_failures,
            evictions = report.evictions,
            eviction_failures = report.eviction_failures,
            cancelled = report.cancelled,
            duration_ms = elapsed.as_millis() as u64,
            "Sync cycle completed"
        );
    } else {
        tracing::trace!(tenants = report.tenants, "Sync cycle completed with no work");
    }
}

// ============================================================================
// TESTS
// ============================================================================
