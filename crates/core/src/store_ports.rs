//! Port interfaces for the shared key-value/stream store
//!
//! These traits define the boundary between the coordination logic and the
//! store client. Any Redis-style backend satisfies them; the in-memory
//! adapter in `flashmart-infra` satisfies them for tests and local runs.
//!
//! Script evaluation is deliberately modeled as typed atomic operations
//! (`compare_and_delete`, `admit`) rather than a raw `eval(script, keys,
//! args)`: a real client holds precompiled script handles behind methods,
//! and the trait documents the atomicity each backend must honor.

use std::time::Duration;

use async_trait::async_trait;
use flashmart_domain::{AdmissionVerdict, OrderMessage, Result};

/// String key-value operations used by locks, caches and counters
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch the live value for `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write `value`, optionally with a physical TTL.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Write `value` with a TTL only if `key` is absent. Returns whether the
    /// write happened. This is the lock-acquisition primitive.
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Remove `key`. Returns whether a live entry existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Atomically increment the integer at `key` (treating absence as zero)
    /// and return the new value.
    async fn incr(&self, key: &str) -> Result<i64>;

    /// Reset the TTL on a live key. Returns false if the key is gone, which
    /// tells a lease-renewal watchdog that its lock has been lost.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Delete `key` only if its current value equals `expected`, in one
    /// indivisible step on the store. Never a read followed by a delete: a
    /// crashed holder's delayed release must not remove a reacquired lock.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool>;
}

/// The flash-sale admission check as a single atomic store operation
#[async_trait]
pub trait AdmissionStore: Send + Sync {
    /// In one indivisible, serially-evaluated step: verify stock remains for
    /// `voucher_id`, verify `user_id` holds no reservation yet, then
    /// decrement stock and record the reservation. This is the only place
    /// oversell and duplicate-order races are prevented under concurrency.
    async fn admit(&self, voucher_id: i64, user_id: i64) -> Result<AdmissionVerdict>;

    /// Seed (or reset) the stock counter for a voucher.
    async fn seed_stock(&self, voucher_id: i64, count: i64) -> Result<()>;

    /// Current stock counter, if seeded.
    async fn stock(&self, voucher_id: i64) -> Result<Option<i64>>;
}

/// A delivered stream entry: opaque monotonic id plus the payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    pub id: String,
    pub message: OrderMessage,
}

/// Cursor mode for consumer-group reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadCursor {
    /// Deliver entries the group has never seen; blocks up to the timeout.
    NextNew,
    /// Re-deliver this consumer's unacknowledged entries, oldest first;
    /// never blocks.
    Pending,
}

/// Durable stream with consumer-group delivery tracking
#[async_trait]
pub trait StreamStore: Send + Sync {
    /// Append a message and return its entry id.
    async fn append(&self, stream: &str, message: &OrderMessage) -> Result<String>;

    /// Create a consumer group positioned after the current tail. Creating
    /// an existing group is a no-op; the stream is created if absent.
    async fn create_group(&self, stream: &str, group: &str) -> Result<()>;

    /// Read up to `count` entries for `consumer`. With [`ReadCursor::NextNew`]
    /// the call blocks up to `block` waiting for traffic; delivered entries
    /// join the group's pending list until acknowledged.
    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        cursor: ReadCursor,
        block: Duration,
        count: usize,
    ) -> Result<Vec<StreamEntry>>;

    /// Acknowledge an entry, removing it from the pending list.
    async fn ack(&self, stream: &str, group: &str, entry_id: &str) -> Result<()>;
}
