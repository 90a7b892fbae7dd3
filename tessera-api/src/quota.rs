//! Per-tenant fixed-window quota gate.

use std::sync::Arc;
use std::time::Duration;

use tessera_core::{ActionClass, QuotaPolicy, TenantId};
use tessera_storage::{QuotaBackend, WindowCounters};

use crate::telemetry::METRICS;

/// Owns the quota counters and exposes them only through [`allow`].
///
/// The limiter fails closed: when the counter backend cannot be reached the
/// request is denied.
///
/// [`allow`]: QuotaLimiter::allow
#[derive(Clone)]
pub struct QuotaLimiter {
    backend: Arc<dyn QuotaBackend>,
    policy: QuotaPolicy,
}

impl QuotaLimiter {
    pub fn new(backend: Arc<dyn QuotaBackend>, policy: QuotaPolicy) -> Self {
        Self { backend, policy }
    }

    /// Limiter over in-process counters.
    pub fn in_memory(policy: QuotaPolicy) -> Self {
        Self::new(Arc::new(WindowCounters::new()), policy)
    }

    /// Window length, used as the retry hint on rejections.
    pub fn window(&self) -> Duration {
        self.policy.window
    }

    /// Consume one unit of `action` quota for `tenant`.
    ///
    /// Returns `false` when the tenant's ceiling for the current window is
    /// reached or when the counter backend fails.
    pub async fn allow(&self, tenant: &TenantId, action: ActionClass) -> bool {
        let limit = self.policy.limit_for(action);
        let granted = match self
            .backend
            .try_acquire(tenant, action, limit, self.policy.window)
            .await
        {
            Ok(granted) => granted,
            Err(e) => {
                tracing::warn!(
                    tenant = %tenant,
                    action = %action,
                    error = %e,
                    "Quota backend unavailable, denying request"
                );
                false
            }
        };

        if !granted {
            if let Ok(metrics) = METRICS.as_ref() {
                metrics.record_quota_rejection(action);
            }
        }
        granted
    }

    /// Drop expired counters. Returns how many were removed.
    pub async fn prune(&self) -> usize {
        match self.backend.prune_expired(self.policy.window).await {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to prune quota counters");
                0
            }
        }
    }
}
