//! Simple token lock: SET-if-absent with a lease, compare-and-delete release

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use flashmart_domain::Result;
use tracing::debug;

use super::{lock_key, LockProvider, LockToken};
use crate::store_ports::KeyValueStore;

/// Non-reentrant lock backed by a single `SETNX` round trip
pub struct SimpleLockProvider {
    store: Arc<dyn KeyValueStore>,
}

impl SimpleLockProvider {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl LockProvider for SimpleLockProvider {
    async fn try_acquire(&self, resource: &str, lease: Duration) -> Result<Option<LockToken>> {
        let token = LockToken::generate();
        let acquired = self.store.set_nx(&lock_key(resource), token.as_str(), lease).await?;
        if acquired {
            debug!(resource = %resource, "lock.acquired");
            Ok(Some(token))
        } else {
            Ok(None)
        }
    }

    async fn release(&self, resource: &str, token: &LockToken) -> Result<()> {
        let deleted = self.store.compare_and_delete(&lock_key(resource), token.as_str()).await?;
        if deleted {
            debug!(resource = %resource, "lock.released");
        } else {
            // Lease expired and possibly reacquired by another holder; the
            // token check already protected them from us.
            debug!(resource = %resource, "lock.release_skipped_stale_token");
        }
        Ok(())
    }
}
