//! Port interfaces for relational persistence
//!
//! These traits define the boundary between core services and the database
//! layer in `flashmart-infra`.

use async_trait::async_trait;
use flashmart_domain::{OrderMessage, OrderOutcome, Result, SeckillVoucher, Shop, VoucherOrder};

/// Durable order persistence with the authoritative uniqueness guarantee
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persist an admitted order in one transaction: re-check that no order
    /// exists for the `(voucher, user)` pair, decrement stock only while it
    /// is positive, and insert the order row under the unique constraint.
    ///
    /// Redelivery of an already-persisted order returns
    /// [`OrderOutcome::AlreadyExists`] instead of an error, which is what
    /// makes queue recovery idempotent.
    async fn create_order(&self, message: &OrderMessage) -> Result<OrderOutcome>;

    /// Look up the persisted order for a `(voucher, user)` pair.
    async fn find_order(&self, voucher_id: i64, user_id: i64) -> Result<Option<VoucherOrder>>;
}

/// Shop rows backing the cache-aside read path
#[async_trait]
pub trait ShopRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<Shop>>;

    async fn insert(&self, shop: &Shop) -> Result<()>;
}

/// Voucher metadata and durable stock
#[async_trait]
pub trait VoucherRepository: Send + Sync {
    async fn insert(&self, voucher: &SeckillVoucher) -> Result<()>;

    async fn find_by_id(&self, id: i64) -> Result<Option<SeckillVoucher>>;

    /// Remaining durable stock for a voucher.
    async fn stock(&self, id: i64) -> Result<Option<i64>>;
}
