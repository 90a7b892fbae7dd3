//! Shared application state for Axum routers.

use std::time::Instant;

use crate::service::KvService;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// Quota-gated KV façade; also gives readiness checks access to the stores.
    pub service: KvService,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(service: KvService) -> Self {
        Self {
            service,
            start_time: Instant::now(),
        }
    }
}

crate::impl_from_ref!(KvService, service);
