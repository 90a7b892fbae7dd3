//! Background Jobs for the Tessera API
//!
//! - `sync`: copies the fast layer into the durable layer, enforces the
//!   per-tenant footprint cap and prunes expired quota counters
//!
//! # Usage
//!
//! ```ignore
//! use tessera_api::jobs::{sync_task, SyncConfig, SyncEngine};
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let engine = Arc::new(SyncEngine::new(fast, durable, config.tenant_cap_bytes));
//! let handle = tokio::spawn(sync_task(engine, limiter, config, shutdown_rx));
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! ```

pub mod sync;

pub use sync::{sync_task, CycleReport, SyncConfig, SyncEngine, SyncMetrics, SyncSnapshot};
