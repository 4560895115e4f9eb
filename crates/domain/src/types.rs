//! Common data types used throughout the application

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Shop entity served through the cache-aside read path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shop {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub avg_price: i64,
    pub score: i32,
}

/// Flash-sale voucher with its remaining stock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeckillVoucher {
    pub id: i64,
    pub shop_id: i64,
    pub title: String,
    pub stock: i64,
    pub begin_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// Persisted flash-sale order row
///
/// Created exactly once per `(voucher_id, user_id)` pair: the admission check
/// is the fast guard, the unique constraint at persistence time is
/// authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherOrder {
    pub id: i64,
    pub user_id: i64,
    pub voucher_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Payload appended to the order stream by the admission step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderMessage {
    pub order_id: i64,
    pub user_id: i64,
    pub voucher_id: i64,
}

/// Outcome of the atomic admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionVerdict {
    /// Stock reserved and the `(voucher, user)` pair recorded
    Admitted,
    /// No stock left
    SoldOut,
    /// The user already holds a reservation for this voucher
    Duplicate,
}

/// Outcome of the persistence-time order write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderOutcome {
    /// The order row was inserted and stock durably decremented
    Created,
    /// The order already exists; redelivery of an acknowledged unit of work
    AlreadyExists,
}

/// Wrapper stored for logical-expiration cache entries
///
/// The store-level key never physically expires; staleness is decided purely
/// by comparing `expire_at` (epoch milliseconds) with the current time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEnvelope<T> {
    pub data: T,
    pub expire_at: i64,
}

impl<T> CacheEnvelope<T> {
    /// Wrap `data` with an expiry `lease_millis` past `now_millis`.
    pub fn new(data: T, now_millis: i64, lease_millis: i64) -> Self {
        Self { data, expire_at: now_millis + lease_millis }
    }

    /// An envelope is stale once its embedded expiry is not in the future.
    pub fn is_expired(&self, now_millis: i64) -> bool {
        self.expire_at <= now_millis
    }
}
