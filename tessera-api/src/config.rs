//! Service Configuration Module
//!
//! Configuration is loaded from environment variables with defaults suitable
//! for a local Redis and PostgreSQL. The legacy `REDIS_ADDR` and
//! `POSTGRES_DSN` variables are honoured when the `TESSERA_*` ones are unset.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use tessera_core::{
    QuotaPolicy, DEFAULT_QUOTA_WINDOW_SECS, DEFAULT_READ_LIMIT, DEFAULT_WRITE_LIMIT,
};
use tessera_storage::{normalize_redis_url, PgConfig};

use crate::constants::{DEFAULT_LISTEN_ADDR, DEFAULT_REDIS_URL, DEFAULT_SHUTDOWN_GRACE_SECS};
use crate::error::{ApiError, ApiResult};
use crate::jobs::SyncConfig;

/// Parse an environment variable, falling back to `default` when it is unset
/// or unparseable.
pub(crate) fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Where quota counters live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaBackendKind {
    /// In-process counters; limits apply per instance.
    Memory,
    /// Shared counters in the fast-layer Redis; limits apply across instances.
    Redis,
}

impl FromStr for QuotaBackendKind {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(QuotaBackendKind::Memory),
            "redis" => Ok(QuotaBackendKind::Redis),
            other => Err(ApiError::invalid_input(format!(
                "Unknown quota backend '{}', expected 'memory' or 'redis'",
                other
            ))),
        }
    }
}

// ============================================================================
// SERVICE CONFIGURATION
// ============================================================================

/// Complete process configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Fast-layer endpoint, always in `redis://` form.
    pub redis_url: String,

    /// Durable-layer pool settings.
    pub database: PgConfig,

    /// HTTP listen address, e.g. `0.0.0.0:8080`.
    pub listen_addr: String,

    /// Per-tenant quota ceilings and window.
    pub quota: QuotaPolicy,

    /// Where quota counters live.
    pub quota_backend: QuotaBackendKind,

    /// Sync/eviction loop settings.
    pub sync: SyncConfig,

    /// How long in-flight work may take to drain on shutdown.
    pub shutdown_grace: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            redis_url: DEFAULT_REDIS_URL.to_string(),
            database: PgConfig::default(),
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            quota: QuotaPolicy::default(),
            quota_backend: QuotaBackendKind::Memory,
            sync: SyncConfig::default(),
            shutdown_grace: Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECS),
        }
    }
}

impl ServiceConfig {
    /// Create ServiceConfig from environment variables.
    ///
    /// Environment variables:
    /// - `TESSERA_REDIS_URL` / `REDIS_ADDR`: fast-layer endpoint (bare `host:port` accepted)
    /// - `TESSERA_DATABASE_URL` / `POSTGRES_DSN`: durable-layer DSN
    /// - `TESSERA_DB_POOL_SIZE`: pool size (default: 16)
    /// - `TESSERA_LISTEN_ADDR`: HTTP listen address (default: 0.0.0.0:8080)
    /// - `TESSERA_READ_LIMIT` / `TESSERA_WRITE_LIMIT`: per-window ceilings (default: 10000 / 1000)
    /// - `TESSERA_QUOTA_WINDOW_SECS`: window length (default: 60)
    /// - `TESSERA_QUOTA_BACKEND`: `memory` or `redis` (default: memory)
    /// - `TESSERA_SYNC_INTERVAL_SECS`, `TESSERA_TENANT_CAP_BYTES`: see [`SyncConfig::from_env`]
    /// - `TESSERA_SHUTDOWN_GRACE_SECS`: drain grace period (default: 5)
    ///
    /// An unrecognised `TESSERA_QUOTA_BACKEND` is an error rather than a
    /// silent fallback.
    pub fn from_env() -> ApiResult<Self> {
        let redis_url = std::env::var("TESSERA_REDIS_URL")
            .or_else(|_| std::env::var("REDIS_ADDR"))
            .map(|raw| normalize_redis_url(&raw))
            .unwrap_or_else(|_| DEFAULT_REDIS_URL.to_string());

        let listen_addr = std::env::var("TESSERA_LISTEN_ADDR")
            .unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.to_string());

        let quota = QuotaPolicy {
            read_limit: env_or("TESSERA_READ_LIMIT", DEFAULT_READ_LIMIT),
            write_limit: env_or("TESSERA_WRITE_LIMIT", DEFAULT_WRITE_LIMIT),
            window: Duration::from_secs(env_or(
                "TESSERA_QUOTA_WINDOW_SECS",
                DEFAULT_QUOTA_WINDOW_SECS,
            )),
        };

        let quota_backend = match std::env::var("TESSERA_QUOTA_BACKEND") {
            Ok(raw) => raw.parse()?,
            Err(_) => QuotaBackendKind::Memory,
        };

        Ok(Self {
            redis_url,
            database: PgConfig::from_env(),
            listen_addr,
            quota,
            quota_backend,
            sync: SyncConfig::from_env(),
            shutdown_grace: Duration::from_secs(env_or(
                "TESSERA_SHUTDOWN_GRACE_SECS",
                DEFAULT_SHUTDOWN_GRACE_SECS,
            )),
        })
    }

    /// Reject configurations the service cannot run with.
    pub fn validate(&self) -> ApiResult<()> {
        self.quota
            .validate()
            .map_err(|e| ApiError::invalid_input(e.to_string()))?;
        if self.sync.interval.is_zero() || self.sync.quota_prune_interval.is_zero() {
            return Err(ApiError::invalid_input("Sync and prune intervals must be non-zero"));
        }
        if self.sync.tenant_cap_bytes == 0 {
            return Err(ApiError::invalid_input("Tenant footprint cap must be non-zero"));
        }
        if self.database.max_size == 0 {
            return Err(ApiError::invalid_input("Database pool size must be non-zero"));
        }
        self.socket_addr()?;
        Ok(())
    }

    /// Parsed listen address.
    pub fn socket_addr(&self) -> ApiResult<SocketAddr> {
        self.listen_addr.parse::<SocketAddr>().map_err(|e| {
            ApiError::invalid_input(format!(
                "Invalid listen address {}: {}",
                self.listen_addr, e
            ))
        })
    }
}
