//! Shop read path over the cache-aside engine
//!
//! The hot read (`query_by_id`) runs the logical-expiration policy against
//! pre-warmed entries; `query_by_id_passthrough` is the lazily-populating
//! variant with the null-marker penetration guard.

use std::sync::Arc;
use std::time::Duration;

use flashmart_common::{Clock, SystemClock};
use flashmart_domain::{FlashMartError, Result, Shop};

use crate::cache::CacheService;
use crate::repositories::ShopRepository;

pub const SHOP_CACHE_PREFIX: &str = "cache:shop:";

/// Physical TTL for passthrough entries.
const SHOP_CACHE_TTL: Duration = Duration::from_secs(30 * 60);
/// Logical lease for pre-warmed entries.
const SHOP_LOGICAL_LEASE: Duration = Duration::from_secs(20 * 60);

/// Cached shop queries exposed to the API layer
pub struct ShopQueryService<C = SystemClock> {
    cache: Arc<CacheService<C>>,
    shops: Arc<dyn ShopRepository>,
}

impl<C> ShopQueryService<C>
where
    C: Clock + Clone + Send + Sync + 'static,
{
    pub fn new(cache: Arc<CacheService<C>>, shops: Arc<dyn ShopRepository>) -> Self {
        Self { cache, shops }
    }

    /// Hot read: logical expiration, stale-but-available during rebuilds.
    ///
    /// Entries are expected to be warmed via [`Self::warm_shop`]; an absent
    /// key means the shop is not part of the pre-populated working set.
    pub async fn query_by_id(&self, id: i64) -> Result<Shop> {
        let shops = Arc::clone(&self.shops);
        let shop = self
            .cache
            .get_with_logical_expire(SHOP_CACHE_PREFIX, id, SHOP_LOGICAL_LEASE, move |shop_id| {
                async move { shops.find_by_id(shop_id).await }
            })
            .await?;
        shop.ok_or_else(|| FlashMartError::NotFound(format!("shop {id}")))
    }

    /// Lazily-populating read with the null-marker penetration guard.
    pub async fn query_by_id_passthrough(&self, id: i64) -> Result<Option<Shop>> {
        let shops = Arc::clone(&self.shops);
        self.cache
            .get_with_passthrough(SHOP_CACHE_PREFIX, id, SHOP_CACHE_TTL, move |shop_id| {
                async move { shops.find_by_id(shop_id).await }
            })
            .await
    }

    /// Load a shop from the repository and pre-populate its
    /// logical-expiration entry.
    pub async fn warm_shop(&self, id: i64) -> Result<()> {
        let shop = self
            .shops
            .find_by_id(id)
            .await?
            .ok_or_else(|| FlashMartError::NotFound(format!("shop {id}")))?;
        self.cache
            .set_with_logical_expire(&format!("{SHOP_CACHE_PREFIX}{id}"), &shop, SHOP_LOGICAL_LEASE)
            .await
    }
}
