//! Prometheus Metrics Definitions
//!
//! Defines all Tessera metrics with their labels and types.
//! Exposes a /metrics endpoint for Prometheus scraping.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, Counter, CounterVec, Encoder,
    Histogram, TextEncoder,
};
use tessera_core::ActionClass;

use crate::error::{ApiError, ApiResult};
use crate::jobs::CycleReport;

/// Sync cycle duration buckets (seconds)
/// Covers: 1ms, 10ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s, 30s
const SYNC_CYCLE_BUCKETS: &[f64] = &[
    0.001, 0.010, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Global metrics instance - initialized once at startup
pub static METRICS: Lazy<ApiResult<TesseraMetrics>> = Lazy::new(TesseraMetrics::new);

/// Container for all Tessera metrics.
#[derive(Clone)]
pub struct TesseraMetrics {
    /// KV request counter - labels: op (put/get/delete), status
    pub kv_requests_total: CounterVec,

    /// Quota rejections - labels: action (read/write)
    pub quota_rejections_total: CounterVec,

    /// Sync cycles that were attempted
    pub sync_cycles_total: Counter,

    /// Sync failures - labels: stage (enumerate/read/upsert/footprint/eviction)
    pub sync_failures_total: CounterVec,

    /// Rows evicted by the footprint cap
    pub evictions_total: Counter,

    /// Sync cycle duration histogram
    pub sync_cycle_duration_seconds: Histogram,
}

fn registration_error(name: &str, e: prometheus::Error) -> ApiError {
    ApiError::internal_error(format!("Failed to register {}: {}", name, e))
}

impl TesseraMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            kv_requests_total: register_counter_vec!(
                "tessera_kv_requests_total",
                "Total number of KV requests",
                &["op", "status"]
            )
            .map_err(|e| registration_error("kv_requests_total", e))?,

            quota_rejections_total: register_counter_vec!(
                "tessera_quota_rejections_total",
                "Requests denied by the quota limiter",
                &["action"]
            )
            .map_err(|e| registration_error("quota_rejections_total", e))?,

            sync_cycles_total: register_counter!(
                "tessera_sync_cycles_total",
                "Total number of sync cycles attempted"
            )
            .map_err(|e| registration_error("sync_cycles_total", e))?,

            sync_failures_total: register_counter_vec!(
                "tessera_sync_failures_total",
                "Failures absorbed by the sync loop",
                &["stage"]
            )
            .map_err(|e| registration_error("sync_failures_total", e))?,

            evictions_total: register_counter!(
                "tessera_evictions_total",
                "Entries evicted to keep tenants under their footprint cap"
            )
            .map_err(|e| registration_error("evictions_total", e))?,

            sync_cycle_duration_seconds: register_histogram!(
                "tessera_sync_cycle_duration_seconds",
                "Sync cycle duration in seconds",
                SYNC_CYCLE_BUCKETS.to_vec()
            )
            .map_err(|e| registration_error("sync_cycle_duration_seconds", e))?,
        })
    }

    /// Record a KV request outcome.
    pub fn record_kv_request(&self, op: &str, status: &str) {
        self.kv_requests_total.with_label_values(&[op, status]).inc();
    }

    /// Record a quota rejection.
    pub fn record_quota_rejection(&self, action: ActionClass) {
        self.quota_rejections_total
            .with_label_values(&[action.as_str()])
            .inc();
    }

    /// Record one sync cycle.
    pub fn record_sync_cycle(&self, report: &CycleReport, duration_secs: f64) {
        self.sync_cycles_total.inc();
        self.sync_cycle_duration_seconds.observe(duration_secs);

        if report.enumeration_failed {
            self.sync_failures_total.with_label_values(&["enumerate"]).inc();
            return;
        }

        let stages = [
            ("read", report.read_failures),
            ("upsert", report.upsert_failures),
            ("footprint", report.footprint_failures),
            ("eviction", report.eviction_failures),
        ];
        for (stage, count) in stages {
            if count > 0 {
                self.sync_failures_total
                    .with_label_values(&[stage])
                    .inc_by(count as f64);
            }
        }
        if report.evictions > 0 {
            self.evictions_total.inc_by(report.evictions as f64);
        }
    }
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
pub async fn metrics_handler() -> impl IntoResponse {
    // Touch the registry so the Tessera families exist before the first request.
    if let Err(e) = METRICS.as_ref() {
        tracing::warn!(error = %e, "Tessera metrics unavailable");
    }

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}
