//! Tessera Telemetry - Observability Infrastructure
//!
//! Structured logging through `tracing-subscriber` and Prometheus metrics
//! for the request path and the sync task.

pub mod metrics;
pub mod tracer;

pub use metrics::{metrics_handler, TesseraMetrics, METRICS};
pub use tracer::{init_tracing, LogFormat, TelemetryConfig};
