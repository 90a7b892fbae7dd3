//! Health Check Endpoints
//!
//! - /health/ping - Simple liveness check
//! - /health/ready - Pings both store layers; 503 when either is down

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tessera_core::TesseraResult;

use crate::state::AppState;

// ============================================================================
// TYPES
// ============================================================================

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HealthDetails>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthDetails {
    pub fast_layer: ComponentHealth,
    pub durable_layer: ComponentHealth,
    pub version: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentHealth {
    fn from_ping(result: TesseraResult<()>, started: Instant) -> Self {
        match result {
            Ok(()) => Self {
                status: HealthStatus::Healthy,
                latency_ms: Some(started.elapsed().as_millis() as u64),
                error: None,
            },
            Err(e) => Self {
                status: HealthStatus::Unhealthy,
                latency_ms: None,
                error: Some(e.to_string()),
            },
        }
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /health/ping - Simple pong response
pub async fn ping() -> impl IntoResponse {
    (StatusCode::OK, "pong")
}

/// GET /health/ready - Readiness check (store connectivity)
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let started = Instant::now();
    let fast_layer = ComponentHealth::from_ping(state.service.fast().ping().await, started);

    let started = Instant::now();
    let durable_layer = ComponentHealth::from_ping(state.service.durable().ping().await, started);

    let overall = if fast_layer.status == HealthStatus::Healthy
        && durable_layer.status == HealthStatus::Healthy
    {
        HealthStatus::Healthy
    } else {
        HealthStatus::Unhealthy
    };

    let response = HealthResponse {
        status: overall,
        details: Some(HealthDetails {
            fast_layer,
            durable_layer,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: state.start_time.elapsed().as_secs(),
        }),
    };

    let status_code = if overall == HealthStatus::Healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(response))
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create health check router, mounted under `/health`.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/ping", get(ping))
        .route("/ready", get(readiness))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: HealthStatus::Healthy,
            details: None,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(json, r#"{"status":"healthy"}"#);
    }

    #[test]
    fn test_component_health_from_failed_ping() {
        let err = tessera_core::StorageError::unavailable("redis", "refused");
        let health = ComponentHealth::from_ping(Err(err.into()), Instant::now());
        assert_eq!(health.status, HealthStatus::Unhealthy);
        assert!(health.error.unwrap().contains("redis"));
    }
}
