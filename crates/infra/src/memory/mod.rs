//! Embedded in-memory implementation of the store contract
//!
//! All atomic sections run under one mutex, which gives the same
//! serialization guarantee the store contract assumes for script
//! evaluation. TTLs are evaluated lazily against an injected clock so lease
//! expiry is testable without sleeping.

mod streams;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use flashmart_common::{Clock, SystemClock};
use flashmart_core::store_ports::{AdmissionStore, KeyValueStore};
use flashmart_domain::{AdmissionVerdict, FlashMartError, Result};
use tokio::sync::Notify;
use tracing::debug;

use self::streams::StreamState;

fn stock_key(voucher_id: i64) -> String {
    format!("seckill:stock:{voucher_id}")
}

struct ValueEntry {
    value: String,
    expires_at: Option<Instant>,
}

#[derive(Default)]
struct Inner {
    kv: HashMap<String, ValueEntry>,
    /// Users holding a reservation per voucher (the admission script's
    /// duplicate set).
    reservations: HashMap<i64, HashSet<i64>>,
    streams: HashMap<String, StreamState>,
}

impl Inner {
    /// Fetch a key, reaping it first if its TTL has lapsed.
    fn live(&mut self, key: &str, now: Instant) -> Option<&ValueEntry> {
        let expired = self
            .kv
            .get(key)
            .is_some_and(|entry| entry.expires_at.is_some_and(|at| at <= now));
        if expired {
            self.kv.remove(key);
        }
        self.kv.get(key)
    }

    fn live_int(&mut self, key: &str, now: Instant) -> Result<Option<i64>> {
        match self.live(key, now) {
            None => Ok(None),
            Some(entry) => entry
                .value
                .parse::<i64>()
                .map(Some)
                .map_err(|_| FlashMartError::Store(format!("counter at {key} is not an integer"))),
        }
    }
}

/// In-memory store satisfying the key-value, admission and stream ports
pub struct MemoryStore<C = SystemClock> {
    inner: Arc<Mutex<Inner>>,
    notify: Arc<Notify>,
    clock: C,
}

impl MemoryStore<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for MemoryStore<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> MemoryStore<C> {
    /// Create a store with a custom clock (useful for testing)
    pub fn with_clock(clock: C) -> Self {
        Self { inner: Arc::new(Mutex::new(Inner::default())), notify: Arc::new(Notify::new()), clock }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|e| FlashMartError::Store(format!("store state poisoned: {e}")))
    }

    fn notify_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.notify)
    }
}

impl<C: Clone> Clone for MemoryStore<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            notify: Arc::clone(&self.notify),
            clock: self.clock.clone(),
        }
    }
}

#[async_trait]
impl<C: Clock + 'static> KeyValueStore for MemoryStore<C> {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = self.clock.now();
        let mut inner = self.lock()?;
        Ok(inner.live(key, now).map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let expires_at = ttl.map(|t| self.clock.now() + t);
        let mut inner = self.lock()?;
        inner.kv.insert(key.to_string(), ValueEntry { value: value.to_string(), expires_at });
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let now = self.clock.now();
        let mut inner = self.lock()?;
        if inner.live(key, now).is_some() {
            return Ok(false);
        }
        inner.kv.insert(
            key.to_string(),
            ValueEntry { value: value.to_string(), expires_at: Some(now + ttl) },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let now = self.clock.now();
        let mut inner = self.lock()?;
        if inner.live(key, now).is_none() {
            return Ok(false);
        }
        Ok(inner.kv.remove(key).is_some())
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let now = self.clock.now();
        let mut inner = self.lock()?;
        let next = inner.live_int(key, now)?.unwrap_or(0) + 1;
        let expires_at = inner.kv.get(key).and_then(|entry| entry.expires_at);
        inner.kv.insert(key.to_string(), ValueEntry { value: next.to_string(), expires_at });
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let now = self.clock.now();
        let mut inner = self.lock()?;
        if inner.live(key, now).is_none() {
            return Ok(false);
        }
        if let Some(entry) = inner.kv.get_mut(key) {
            entry.expires_at = Some(now + ttl);
        }
        Ok(true)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        let now = self.clock.now();
        let mut inner = self.lock()?;
        if inner.live(key, now).is_some_and(|entry| entry.value == expected) {
            inner.kv.remove(key);
            return Ok(true);
        }
        Ok(false)
    }
}

#[async_trait]
impl<C: Clock + 'static> AdmissionStore for MemoryStore<C> {
    async fn admit(&self, voucher_id: i64, user_id: i64) -> Result<AdmissionVerdict> {
        let now = self.clock.now();
        // One guard across all four steps: the check-decrement-reserve
        // sequence is indivisible, exactly like script evaluation on the
        // real store.
        let mut inner = self.lock()?;

        let key = stock_key(voucher_id);
        let stock = match inner.live_int(&key, now)? {
            Some(stock) => stock,
            None => {
                debug!(voucher_id, "admission.stock_not_seeded");
                return Ok(AdmissionVerdict::SoldOut);
            }
        };
        if stock <= 0 {
            return Ok(AdmissionVerdict::SoldOut);
        }

        if inner.reservations.get(&voucher_id).is_some_and(|users| users.contains(&user_id)) {
            return Ok(AdmissionVerdict::Duplicate);
        }

        inner
            .kv
            .insert(key, ValueEntry { value: (stock - 1).to_string(), expires_at: None });
        inner.reservations.entry(voucher_id).or_default().insert(user_id);
        Ok(AdmissionVerdict::Admitted)
    }

    async fn seed_stock(&self, voucher_id: i64, count: i64) -> Result<()> {
        let mut inner = self.lock()?;
        inner
            .kv
            .insert(stock_key(voucher_id), ValueEntry { value: count.to_string(), expires_at: None });
        // Seeding resets the voucher: stale reservations would block a rerun.
        inner.reservations.remove(&voucher_id);
        Ok(())
    }

    async fn stock(&self, voucher_id: i64) -> Result<Option<i64>> {
        let now = self.clock.now();
        let mut inner = self.lock()?;
        inner.live_int(&stock_key(voucher_id), now)
    }
}

#[cfg(test)]
mod tests {
    use flashmart_common::MockClock;

    use super::*;

    #[tokio::test]
    async fn get_returns_none_after_ttl_lapses() {
        let clock = MockClock::new();
        let store = MemoryStore::with_clock(clock.clone());

        store.set("k", "v", Some(Duration::from_secs(5))).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        clock.advance_secs(6);
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_nx_respects_live_keys_but_not_expired_ones() {
        let clock = MockClock::new();
        let store = MemoryStore::with_clock(clock.clone());
        let ttl = Duration::from_secs(10);

        assert!(store.set_nx("lock:a", "t1", ttl).await.unwrap());
        assert!(!store.set_nx("lock:a", "t2", ttl).await.unwrap());

        clock.advance_secs(11);
        assert!(store.set_nx("lock:a", "t3", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn incr_starts_at_one_and_counts_up() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("icr:order:20260806").await.unwrap(), 1);
        assert_eq!(store.incr("icr:order:20260806").await.unwrap(), 2);
        assert_eq!(store.incr("icr:order:20260806").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn compare_and_delete_only_removes_matching_value() {
        let store = MemoryStore::new();
        store.set("lock:a", "token-1", None).await.unwrap();

        assert!(!store.compare_and_delete("lock:a", "token-2").await.unwrap());
        assert_eq!(store.get("lock:a").await.unwrap().as_deref(), Some("token-1"));

        assert!(store.compare_and_delete("lock:a", "token-1").await.unwrap());
        assert_eq!(store.get("lock:a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expire_reports_missing_keys() {
        let store = MemoryStore::new();
        assert!(!store.expire("gone", Duration::from_secs(1)).await.unwrap());

        store.set("here", "v", None).await.unwrap();
        assert!(store.expire("here", Duration::from_secs(1)).await.unwrap());
    }

    #[tokio::test]
    async fn admission_runs_down_stock_then_rejects() {
        let store = MemoryStore::new();
        store.seed_stock(1, 2).await.unwrap();

        assert_eq!(store.admit(1, 100).await.unwrap(), AdmissionVerdict::Admitted);
        assert_eq!(store.admit(1, 101).await.unwrap(), AdmissionVerdict::Admitted);
        assert_eq!(store.admit(1, 102).await.unwrap(), AdmissionVerdict::SoldOut);
        assert_eq!(store.stock(1).await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn admission_rejects_second_attempt_by_same_user() {
        let store = MemoryStore::new();
        store.seed_stock(1, 10).await.unwrap();

        assert_eq!(store.admit(1, 100).await.unwrap(), AdmissionVerdict::Admitted);
        assert_eq!(store.admit(1, 100).await.unwrap(), AdmissionVerdict::Duplicate);
        // The duplicate did not burn stock
        assert_eq!(store.stock(1).await.unwrap(), Some(9));
    }

    #[tokio::test]
    async fn admission_without_seeded_stock_is_sold_out() {
        let store = MemoryStore::new();
        assert_eq!(store.admit(99, 1).await.unwrap(), AdmissionVerdict::SoldOut);
    }

    #[tokio::test]
    async fn reseeding_clears_reservations() {
        let store = MemoryStore::new();
        store.seed_stock(1, 1).await.unwrap();
        assert_eq!(store.admit(1, 100).await.unwrap(), AdmissionVerdict::Admitted);

        store.seed_stock(1, 1).await.unwrap();
        assert_eq!(store.admit(1, 100).await.unwrap(), AdmissionVerdict::Admitted);
    }
}
