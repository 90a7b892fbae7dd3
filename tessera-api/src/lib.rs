//! Tessera API - Quota-Gated Multi-Tenant KV Service
//!
//! This crate wires the store engines from `tessera-storage` into:
//!
//! - [`QuotaLimiter`]: per-tenant fixed-window read/write quotas
//! - [`KvService`]: the request-path façade (put/get/delete)
//! - [`jobs::SyncEngine`]: the periodic fast-to-durable sync with
//!   oldest-first eviction over the per-tenant footprint cap
//! - an Axum HTTP adapter, configuration and telemetry

pub mod config;
pub mod constants;
pub mod error;
pub mod jobs;
pub mod macros;
pub mod quota;
pub mod routes;
pub mod service;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use config::{QuotaBackendKind, ServiceConfig};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use jobs::{sync_task, CycleReport, SyncConfig, SyncEngine, SyncMetrics};
pub use quota::QuotaLimiter;
pub use routes::create_router;
pub use service::KvService;
pub use state::AppState;
