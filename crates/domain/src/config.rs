//! Configuration structures shared across crates
//!
//! Values are loaded by `flashmart-infra`'s loader (environment first, TOML
//! file fallback); these types only describe the shape and the defaults.

use serde::{Deserialize, Serialize};

/// Relational database settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "flashmart.db".into(), pool_size: 4 }
    }
}

/// Cache-aside engine tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Physical TTL for null-markers (seconds). Kept short so a nonexistent
    /// id cannot shadow a later insert for long.
    pub null_ttl_secs: u64,
    /// Lease on the per-key rebuild lock (seconds).
    pub rebuild_lock_lease_secs: u64,
    /// Upper bound on concurrently running background rebuilds.
    pub rebuild_workers: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { null_ttl_secs: 120, rebuild_lock_lease_secs: 10, rebuild_workers: 10 }
    }
}

/// Flash-sale pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeckillConfig {
    /// Durable stream the admission step appends to.
    pub order_stream: String,
    /// Consumer-group name on that stream.
    pub consumer_group: String,
    /// This process's consumer name within the group.
    pub consumer_name: String,
    /// Upper bound on a single blocking stream read (seconds); the consumer
    /// loop rechecks its cancellation token at least this often.
    pub block_timeout_secs: u64,
}

impl Default for SeckillConfig {
    fn default() -> Self {
        Self {
            order_stream: "stream:orders".into(),
            consumer_group: "g1".into(),
            consumer_name: "c1".into(),
            block_timeout_secs: 2,
        }
    }
}

/// Top-level application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub seckill: SeckillConfig,
}
