//! Redis engines: hash-per-tenant fast layer and shared quota counters.
//!
//! Each tenant owns one hash at `tenant:{tenant}` whose fields are entry
//! keys. Quota counters live at `quota:{tenant}:{action}`.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError, Script};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{error, warn};

use tessera_core::{
    ActionClass, EntryKey, StorageError, TenantId, TesseraError, TesseraResult,
};

use crate::traits::{FastStore, QuotaBackend};

const TENANT_PREFIX: &str = "tenant:";
const SCAN_BATCH: usize = 500;

/// Check-and-increment in one script evaluation. The expiry is only set on
/// the first increment, so the window is anchored at its first unit.
const QUOTA_SCRIPT: &str = r#"
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
if current >= tonumber(ARGV[1]) then
    return 0
end
local n = redis.call('INCR', KEYS[1])
if n == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[2])
end
return 1
"#;

/// Accept either a full `redis://` URL or a bare `host:port` address.
pub fn normalize_redis_url(raw: &str) -> String {
    let raw = raw.trim();
    if raw.contains("://") {
        raw.to_string()
    } else {
        format!("redis://{}", raw)
    }
}

fn tenant_namespace(tenant: &TenantId) -> String {
    format!("{}{}", TENANT_PREFIX, tenant)
}

fn quota_key(tenant: &TenantId, action: ActionClass) -> String {
    format!("quota:{}:{}", tenant, action.as_str())
}

fn redis_error(op: &'static str, err: RedisError) -> TesseraError {
    error!(op, error = %err, "Redis command failed");
    StorageError::unavailable("redis", err).into()
}

async fn connect(url: &str) -> TesseraResult<ConnectionManager> {
    let client = Client::open(normalize_redis_url(url)).map_err(|e| redis_error("open", e))?;
    ConnectionManager::new(client)
        .await
        .map_err(|e| redis_error("connect", e))
}

// ============================================================================
// FAST LAYER
// ============================================================================

/// Fast layer backed by one Redis hash per tenant.
///
/// The connection manager reconnects on its own; clones share the same
/// multiplexed connection.
#[derive(Clone)]
pub struct RedisFastStore {
    conn: ConnectionManager,
}

impl RedisFastStore {
    /// Connect and verify the server answers.
    pub async fn connect(url: &str) -> TesseraResult<Self> {
        let store = Self {
            conn: connect(url).await?,
        };
        store.ping().await?;
        Ok(store)
    }
}

#[async_trait]
impl FastStore for RedisFastStore {
    async fn put(&self, tenant: &TenantId, key: &EntryKey, value: &[u8]) -> TesseraResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .hset(tenant_namespace(tenant), key.as_str(), value)
            .await
            .map_err(|e| redis_error("HSET", e))?;
        Ok(())
    }

    async fn get(&self, tenant: &TenantId, key: &EntryKey) -> TesseraResult<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn
            .hget(tenant_namespace(tenant), key.as_str())
            .await
            .map_err(|e| redis_error("HGET", e))?;
        Ok(value)
    }

    async fn remove(&self, tenant: &TenantId, key: &EntryKey) -> TesseraResult<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn
            .hdel(tenant_namespace(tenant), key.as_str())
            .await
            .map_err(|e| redis_error("HDEL", e))?;
        Ok(removed > 0)
    }

    async fn list_tenants(&self) -> TesseraResult<Vec<TenantId>> {
        let mut conn = self.conn.clone();
        let pattern = format!("{}*", TENANT_PREFIX);
        let mut seen = BTreeSet::new();
        let mut cursor: u64 = 0;

        // SCAN may return a key more than once; the set deduplicates.
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(|e| redis_error("SCAN", e))?;

            for raw in batch {
                let Some(name) = raw.strip_prefix(TENANT_PREFIX) else {
                    continue;
                };
                match TenantId::new(name) {
                    Ok(tenant) => {
                        seen.insert(tenant);
                    }
                    Err(e) => warn!(namespace = %raw, error = %e, "Skipping unusable tenant namespace"),
                }
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(seen.into_iter().collect())
    }

    async fn list_keys(&self, tenant: &TenantId) -> TesseraResult<Vec<EntryKey>> {
        let mut conn = self.conn.clone();
        let fields: Vec<String> = conn
            .hkeys(tenant_namespace(tenant))
            .await
            .map_err(|e| redis_error("HKEYS", e))?;

        let mut keys: Vec<EntryKey> = fields
            .into_iter()
            .filter_map(|field| match EntryKey::new(field.as_str()) {
                Ok(key) => Some(key),
                Err(e) => {
                    warn!(tenant = %tenant, field = %field, error = %e, "Skipping unusable hash field");
                    None
                }
            })
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn ping(&self) -> TesseraResult<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_error("PING", e))?;
        Ok(())
    }
}

// ============================================================================
// QUOTA COUNTERS
// ============================================================================

/// Fixed-window counters shared by every instance pointed at the same Redis.
///
/// Expiry is delegated to Redis key TTLs, so `prune_expired` keeps the
/// trait default.
#[derive(Clone)]
pub struct RedisQuotaBackend {
    conn: ConnectionManager,
    script: Script,
}

impl RedisQuotaBackend {
    pub async fn connect(url: &str) -> TesseraResult<Self> {
        Ok(Self {
            conn: connect(url).await?,
            script: Script::new(QUOTA_SCRIPT),
        })
    }
}

#[async_trait]
impl QuotaBackend for RedisQuotaBackend {
    async fn try_acquire(
        &self,
        tenant: &TenantId,
        action: ActionClass,
        limit: u32,
        window: Duration,
    ) -> TesseraResult<bool> {
        let mut conn = self.conn.clone();
        let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX).max(1);
        let granted: i64 = self
            .script
            .key(quota_key(tenant, action))
            .arg(limit)
            .arg(window_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| redis_error("EVALSHA", e))?;
        Ok(granted == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_bare_address() {
        assert_eq!(normalize_redis_url("localhost:6379"), "redis://localhost:6379");
        assert_eq!(normalize_redis_url(" cache:6380 "), "redis://cache:6380");
    }

    #[test]
    fn test_normalize_keeps_full_url() {
        assert_eq!(
            normalize_redis_url("redis://:secret@cache:6379/2"),
            "redis://:secret@cache:6379/2"
        );
        assert_eq!(normalize_redis_url("rediss://cache:6380"), "rediss://cache:6380");
    }

    #[test]
    fn test_key_layout() {
        let tenant = TenantId::new("acme").unwrap();
        assert_eq!(tenant_namespace(&tenant), "tenant:acme");
        assert_eq!(quota_key(&tenant, ActionClass::Write), "quota:acme:write");
        assert_eq!(quota_key(&tenant, ActionClass::Read), "quota:acme:read");
    }
}
