//! Lease-renewing lock: same capability, plus reentrancy and a watchdog
//!
//! Used where the critical section's duration is not bounded in advance. An
//! internal task extends the lease at one-third intervals until the final
//! release; callers see nothing beyond the [`LockProvider`] contract.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use flashmart_domain::Result;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{lock_key, LockProvider, LockToken};
use crate::store_ports::KeyValueStore;

struct Holder {
    token: LockToken,
    count: u32,
    watchdog: JoinHandle<()>,
}

/// Reentrant, lease-renewing lock provider
///
/// Reentrancy is scoped to this provider instance: the instance is the
/// execution context, and re-acquiring a resource it already holds bumps a
/// holder count instead of hitting the store.
pub struct RenewingLockProvider {
    store: Arc<dyn KeyValueStore>,
    holders: DashMap<String, Holder>,
}

impl RenewingLockProvider {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store, holders: DashMap::new() }
    }

    fn spawn_watchdog(&self, key: String, lease: Duration) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let interval = (lease / 3).max(Duration::from_millis(1));
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                match store.expire(&key, lease).await {
                    Ok(true) => {}
                    Ok(false) => {
                        // Key vanished: the lease lapsed before this renewal.
                        warn!(key = %key, "lock.renewal_lost");
                        break;
                    }
                    Err(error) => {
                        warn!(key = %key, error = %error, "lock.renewal_failed");
                        break;
                    }
                }
            }
        })
    }
}

#[async_trait]
impl LockProvider for RenewingLockProvider {
    async fn try_acquire(&self, resource: &str, lease: Duration) -> Result<Option<LockToken>> {
        if let Some(mut holder) = self.holders.get_mut(resource) {
            holder.count += 1;
            debug!(resource = %resource, count = holder.count, "lock.reentered");
            return Ok(Some(holder.token.clone()));
        }

        let token = LockToken::generate();
        let key = lock_key(resource);
        if !self.store.set_nx(&key, token.as_str(), lease).await? {
            return Ok(None);
        }

        let watchdog = self.spawn_watchdog(key, lease);
        self.holders
            .insert(resource.to_string(), Holder { token: token.clone(), count: 1, watchdog });
        debug!(resource = %resource, "lock.acquired_renewing");
        Ok(Some(token))
    }

    async fn release(&self, resource: &str, token: &LockToken) -> Result<()> {
        if let Entry::Occupied(mut occupied) = self.holders.entry(resource.to_string()) {
            if occupied.get().token == *token {
                if occupied.get().count > 1 {
                    occupied.get_mut().count -= 1;
                    debug!(resource = %resource, count = occupied.get().count, "lock.reentrant_release");
                    return Ok(());
                }
                let holder = occupied.remove();
                holder.watchdog.abort();
            }
        }

        // Token-checked delete on the store; a stale token is a no-op there.
        let deleted = self.store.compare_and_delete(&lock_key(resource), token.as_str()).await?;
        if deleted {
            debug!(resource = %resource, "lock.released");
        }
        Ok(())
    }
}

impl Drop for RenewingLockProvider {
    fn drop(&mut self) {
        for entry in self.holders.iter() {
            entry.value().watchdog.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubStore;

    #[tokio::test]
    async fn reentrant_acquire_returns_same_token() {
        let store = Arc::new(StubStore::new());
        let locks = RenewingLockProvider::new(store);
        let lease = Duration::from_secs(30);

        let first = locks.try_acquire("order:9", lease).await.unwrap().unwrap();
        let second = locks.try_acquire("order:9", lease).await.unwrap().unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn lock_survives_until_outermost_release() {
        let store: Arc<dyn KeyValueStore> = Arc::new(StubStore::new());
        let locks = RenewingLockProvider::new(Arc::clone(&store));
        let lease = Duration::from_secs(30);

        let token = locks.try_acquire("order:9", lease).await.unwrap().unwrap();
        let _ = locks.try_acquire("order:9", lease).await.unwrap().unwrap();

        locks.release("order:9", &token).await.unwrap();
        // Inner release: the store entry must still be there
        assert!(store.get(&lock_key("order:9")).await.unwrap().is_some());

        locks.release("order:9", &token).await.unwrap();
        assert!(store.get(&lock_key("order:9")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn contended_acquire_fails_for_other_provider() {
        let store: Arc<dyn KeyValueStore> = Arc::new(StubStore::new());
        let holder = RenewingLockProvider::new(Arc::clone(&store));
        let challenger = RenewingLockProvider::new(Arc::clone(&store));
        let lease = Duration::from_secs(30);

        let _token = holder.try_acquire("order:9", lease).await.unwrap().unwrap();
        assert!(challenger.try_acquire("order:9", lease).await.unwrap().is_none());
    }
}
