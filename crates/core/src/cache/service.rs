use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use flashmart_common::{Clock, SystemClock};
use flashmart_domain::{CacheConfig, CacheEnvelope, FlashMartError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::lock::LockProvider;
use crate::store_ports::KeyValueStore;

/// Payload written for ids that do not exist in the backing source.
///
/// Short physical TTL, no logical-expire field: a later insert becomes
/// visible as soon as the marker lapses.
const NULL_MARKER: &str = "";

/// Cache-aside facility with penetration and stampede protection
///
/// Rebuilds for the logical-expiration policy run on a bounded background
/// pool; submission never blocks the calling read, and a slow loader never
/// blocks readers.
pub struct CacheService<C = SystemClock> {
    store: Arc<dyn KeyValueStore>,
    locks: Arc<dyn LockProvider>,
    rebuilds: Arc<Semaphore>,
    max_rebuilds: usize,
    null_ttl: Duration,
    rebuild_lock_lease: Duration,
    clock: C,
}

impl CacheService<SystemClock> {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        locks: Arc<dyn LockProvider>,
        config: CacheConfig,
    ) -> Self {
        Self::with_clock(store, locks, config, SystemClock)
    }
}

impl<C> CacheService<C>
where
    C: Clock + Clone + Send + Sync + 'static,
{
    /// Create a service with a custom clock (useful for testing)
    pub fn with_clock(
        store: Arc<dyn KeyValueStore>,
        locks: Arc<dyn LockProvider>,
        config: CacheConfig,
        clock: C,
    ) -> Self {
        let max_rebuilds = config.rebuild_workers.max(1);
        Self {
            store,
            locks,
            rebuilds: Arc::new(Semaphore::new(max_rebuilds)),
            max_rebuilds,
            null_ttl: Duration::from_secs(config.null_ttl_secs),
            rebuild_lock_lease: Duration::from_secs(config.rebuild_lock_lease_secs),
            clock,
        }
    }

    /// Write a value with a physical TTL (passthrough policy).
    pub async fn set_with_ttl<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<()> {
        let payload = encode(key, value)?;
        self.store.set(key, &payload, Some(ttl)).await
    }

    /// Write a value wrapped in a logical-expiration envelope. The store key
    /// never physically expires; staleness is decided against the embedded
    /// timestamp. Entries for the logical-expiration policy are pre-populated
    /// through this method.
    pub async fn set_with_logical_expire<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        lease: Duration,
    ) -> Result<()> {
        let envelope = CacheEnvelope::new(
            value,
            self.clock.millis_since_epoch() as i64,
            lease.as_millis() as i64,
        );
        let payload = encode(key, &envelope)?;
        self.store.set(key, &payload, None).await
    }

    /// Passthrough read: on miss call `loader`; cache its hit with `ttl` or
    /// its not-found as a short-lived null-marker so repeated lookups for a
    /// nonexistent id stop reaching the backing source.
    pub async fn get_with_passthrough<T, F, Fut>(
        &self,
        prefix: &str,
        id: i64,
        ttl: Duration,
        loader: F,
    ) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(i64) -> Fut,
        Fut: Future<Output = Result<Option<T>>> + Send,
    {
        let key = format!("{prefix}{id}");
        match self.store.get(&key).await? {
            Some(raw) if raw == NULL_MARKER => return Ok(None),
            Some(raw) => return decode(&key, &raw).map(Some),
            None => {}
        }

        match loader(id).await? {
            Some(value) => {
                self.set_with_ttl(&key, &value, ttl).await?;
                Ok(Some(value))
            }
            None => {
                self.store.set(&key, NULL_MARKER, Some(self.null_ttl)).await?;
                Ok(None)
            }
        }
    }

    /// Logical-expiration read: absent keys are a plain not-found (entries
    /// are pre-populated, never lazily created here). A fresh entry is
    /// returned directly; a stale one is returned immediately as well, while
    /// at most one guarded rebuild is submitted in the background. Losers of
    /// the rebuild lock simply serve stale.
    pub async fn get_with_logical_expire<T, F, Fut>(
        &self,
        prefix: &str,
        id: i64,
        lease: Duration,
        loader: F,
    ) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce(i64) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<T>>> + Send + 'static,
    {
        let key = format!("{prefix}{id}");
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };

        let envelope: CacheEnvelope<T> = decode(&key, &raw)?;
        if !envelope.is_expired(self.clock.millis_since_epoch() as i64) {
            return Ok(Some(envelope.data));
        }

        self.try_submit_rebuild(key, id, lease, loader).await;
        Ok(Some(envelope.data))
    }

    /// Wait for in-flight rebuilds to finish and refuse new submissions.
    pub async fn close(&self) {
        if let Ok(drained) = self.rebuilds.acquire_many(self.max_rebuilds as u32).await {
            drained.forget();
        }
        self.rebuilds.close();
    }

    /// Submit a rebuild if a pool slot and the per-key lock are available.
    /// Never blocks: saturation or contention means this read serves stale
    /// and the next expired read tries again.
    async fn try_submit_rebuild<T, F, Fut>(&self, key: String, id: i64, lease: Duration, loader: F)
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce(i64) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<T>>> + Send + 'static,
    {
        let Ok(permit) = Arc::clone(&self.rebuilds).try_acquire_owned() else {
            debug!(key = %key, "cache.rebuild_pool_unavailable");
            return;
        };

        let token = match self.locks.try_acquire(&key, self.rebuild_lock_lease).await {
            Ok(Some(token)) => token,
            Ok(None) => return,
            Err(error) => {
                warn!(key = %key, error = %error, "cache.rebuild_lock_failed");
                return;
            }
        };

        let store = Arc::clone(&self.store);
        let locks = Arc::clone(&self.locks);
        let clock = self.clock.clone();
        let _task = tokio::spawn(async move {
            let _permit = permit;
            let outcome = rebuild_entry(store, clock, &key, id, lease, loader).await;
            if let Err(error) = outcome {
                warn!(key = %key, error = %error, "cache.rebuild_failed");
            }
            // Release on every exit path so a later stale read can retry.
            if let Err(error) = locks.release(&key, &token).await {
                warn!(key = %key, error = %error, "cache.rebuild_unlock_failed");
            }
        });
    }
}

async fn rebuild_entry<T, F, Fut, C>(
    store: Arc<dyn KeyValueStore>,
    clock: C,
    key: &str,
    id: i64,
    lease: Duration,
    loader: F,
) -> Result<()>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce(i64) -> Fut,
    Fut: Future<Output = Result<Option<T>>> + Send,
    C: Clock,
{
    match loader(id).await? {
        Some(value) => {
            let envelope = CacheEnvelope::new(
                value,
                clock.millis_since_epoch() as i64,
                lease.as_millis() as i64,
            );
            let payload = encode(key, &envelope)?;
            store.set(key, &payload, None).await?;
            debug!(key = %key, "cache.rebuilt");
            Ok(())
        }
        None => {
            // Backing row vanished. Keep serving the stale entry rather than
            // poisoning a pre-populated key with a null envelope.
            warn!(key = %key, "cache.rebuild_source_missing");
            Ok(())
        }
    }
}

fn encode<T: Serialize>(key: &str, value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| FlashMartError::Internal(format!("cache entry for {key} failed to encode: {e}")))
}

fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> Result<T> {
    serde_json::from_str(raw)
        .map_err(|e| FlashMartError::Internal(format!("cache entry for {key} is corrupt: {e}")))
}
