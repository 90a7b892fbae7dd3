//! Quota-gated key-value service.
//!
//! Requests touch the fast layer only, except deletes which also remove the
//! durable row. The durable layer otherwise catches up through the sync
//! engine within one sync period.

use std::sync::Arc;

use tessera_core::{
    ActionClass, EntryKey, Payload, TenantId, TesseraError, TesseraResult, ValidationError,
};
use tessera_storage::{DurableStore, FastStore};

use crate::quota::QuotaLimiter;
use crate::telemetry::METRICS;

/// Request-path façade over the two store layers.
#[derive(Clone)]
pub struct KvService {
    fast: Arc<dyn FastStore>,
    durable: Arc<dyn DurableStore>,
    limiter: QuotaLimiter,
}

impl KvService {
    pub fn new(
        fast: Arc<dyn FastStore>,
        durable: Arc<dyn DurableStore>,
        limiter: QuotaLimiter,
    ) -> Self {
        Self {
            fast,
            durable,
            limiter,
        }
    }

    pub fn fast(&self) -> &Arc<dyn FastStore> {
        &self.fast
    }

    pub fn durable(&self) -> &Arc<dyn DurableStore> {
        &self.durable
    }

    pub fn limiter(&self) -> &QuotaLimiter {
        &self.limiter
    }

    /// Store `body` under `(tenant, key)`.
    ///
    /// The payload is validated before any quota is consumed, so a rejected
    /// body never costs the tenant a write unit.
    pub async fn put(
        &self,
        tenant: &TenantId,
        key: &EntryKey,
        body: impl Into<Vec<u8>>,
    ) -> TesseraResult<()> {
        let result = self.put_inner(tenant, key, body.into()).await;
        observe("put", &result);
        result
    }

    async fn put_inner(&self, tenant: &TenantId, key: &EntryKey, body: Vec<u8>) -> TesseraResult<()> {
        let payload = Payload::parse(body)?;
        self.admit(tenant, ActionClass::Write).await?;
        self.fast.put(tenant, key, payload.as_bytes()).await?;
        tracing::debug!(tenant = %tenant, key = %key, bytes = payload.len(), "Stored entry");
        Ok(())
    }

    /// Read the current value of `(tenant, key)` from the fast layer.
    pub async fn get(&self, tenant: &TenantId, key: &EntryKey) -> TesseraResult<Vec<u8>> {
        let result = self.get_inner(tenant, key).await;
        observe("get", &result);
        result
    }

    async fn get_inner(&self, tenant: &TenantId, key: &EntryKey) -> TesseraResult<Vec<u8>> {
        self.admit(tenant, ActionClass::Read).await?;
        self.fast
            .get(tenant, key)
            .await?
            .ok_or_else(|| TesseraError::NotFound {
                tenant: tenant.to_string(),
                key: key.to_string(),
            })
    }

    /// Remove `(tenant, key)` from both layers.
    ///
    /// Deleting an absent key succeeds. If the durable removal fails after
    /// the fast removal succeeded, the error is returned and the fast-layer
    /// removal stays in place; the durable row is cleaned up by a later
    /// delete or by eviction.
    pub async fn delete(&self, tenant: &TenantId, key: &EntryKey) -> TesseraResult<()> {
        let result = self.delete_inner(tenant, key).await;
        observe("delete", &result);
        result
    }

    async fn delete_inner(&self, tenant: &TenantId, key: &EntryKey) -> TesseraResult<()> {
        self.admit(tenant, ActionClass::Write).await?;
        self.fast.remove(tenant, key).await?;
        if let Err(e) = self.durable.delete(tenant, key).await {
            tracing::error!(
                tenant = %tenant,
                key = %key,
                error = %e,
                "Durable delete failed after fast-layer removal"
            );
            return Err(e);
        }
        tracing::debug!(tenant = %tenant, key = %key, "Deleted entry");
        Ok(())
    }

    async fn admit(&self, tenant: &TenantId, action: ActionClass) -> TesseraResult<()> {
        if self.limiter.allow(tenant, action).await {
            Ok(())
        } else {
            Err(TesseraError::QuotaExceeded {
                tenant: tenant.to_string(),
                action,
            })
        }
    }
}

/// Metric status label for a request outcome.
fn status_label<T>(result: &TesseraResult<T>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(TesseraError::QuotaExceeded { .. }) => "quota_exceeded",
        Err(TesseraError::Validation(ValidationError::InvalidValue { .. })) => "invalid_input",
        Err(TesseraError::Validation(_)) => "invalid_payload",
        Err(TesseraError::NotFound { .. }) => "not_found",
        Err(TesseraError::Storage(_)) => "store_unavailable",
    }
}

fn observe<T>(op: &str, result: &TesseraResult<T>) {
    if let Ok(metrics) = METRICS.as_ref() {
        metrics.record_kv_request(op, status_label(result));
    }
}
