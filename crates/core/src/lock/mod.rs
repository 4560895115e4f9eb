//! Distributed mutual exclusion over the shared store
//!
//! One capability, two backends: [`SimpleLockProvider`] for short, bounded
//! critical sections and [`RenewingLockProvider`] where the section's
//! duration is not known in advance (order persistence spans a transaction).
//! Acquisition is always non-blocking; callers that want to wait loop with
//! `flashmart_common::retry_with_backoff` and an attempt bound.

mod renewing;
mod simple;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use flashmart_domain::Result;
pub use renewing::RenewingLockProvider;
pub use simple::SimpleLockProvider;
use uuid::Uuid;

const LOCK_KEY_PREFIX: &str = "lock:";

pub(crate) fn lock_key(resource: &str) -> String {
    format!("{LOCK_KEY_PREFIX}{resource}")
}

/// Opaque value identifying the acquiring execution context
///
/// Release only succeeds when the stored token equals the caller's, so a
/// holder whose lease expired cannot delete a lock someone else reacquired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken(String);

impl LockToken {
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Token-based distributed mutual exclusion
#[async_trait]
pub trait LockProvider: Send + Sync {
    /// Try to take the lock in a single store round trip. Returns a fresh
    /// token on success, `None` if someone else holds it. The lease bounds
    /// how long a crashed holder can wedge the resource.
    async fn try_acquire(&self, resource: &str, lease: Duration) -> Result<Option<LockToken>>;

    /// Release the lock if `token` still matches the stored value; otherwise
    /// a no-op. Safe to call after the lease has expired.
    async fn release(&self, resource: &str, token: &LockToken) -> Result<()>;
}
