//! Tessera Storage - Store Capability Traits and Engines
//!
//! The service layer and the sync engine only ever see the traits in
//! [`traits`]. Concrete engines:
//!
//! - [`memory`]: in-process engines used by tests and single-node setups
//! - [`redis_store`]: Redis hash-per-tenant fast layer and shared quota counters
//! - [`postgres`]: PostgreSQL durable layer over a deadpool connection pool

pub mod memory;
pub mod postgres;
pub mod redis_store;
pub mod traits;

pub use memory::{MemoryDurableStore, MemoryFastStore, WindowCounters};
pub use postgres::{PgConfig, PgDurableStore};
pub use redis_store::{normalize_redis_url, RedisFastStore, RedisQuotaBackend};
pub use traits::{DurableStore, FastStore, QuotaBackend};
