//! Cache-aside behavior end-to-end: in-memory store, SQLite-backed shops.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use flashmart_common::MockClock;
use flashmart_core::repositories::ShopRepository;
use flashmart_core::store_ports::KeyValueStore;
use flashmart_core::{CacheService, ShopQueryService, SimpleLockProvider};
use flashmart_domain::{CacheConfig, Result, Shop};
use flashmart_infra::{DbManager, MemoryStore, SqliteShopRepository};
use tempfile::TempDir;
use tokio::task::JoinSet;

/// Counts loader hits on the way through to the real repository.
struct CountingShopRepository {
    inner: Arc<dyn ShopRepository>,
    loads: AtomicUsize,
    delay: Duration,
}

impl CountingShopRepository {
    fn with_delay(inner: Arc<dyn ShopRepository>, delay: Duration) -> Self {
        Self { inner, loads: AtomicUsize::new(0), delay }
    }

    fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ShopRepository for CountingShopRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Shop>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.find_by_id(id).await
    }

    async fn insert(&self, shop: &Shop) -> Result<()> {
        self.inner.insert(shop).await
    }
}

struct Fixture {
    clock: MockClock,
    service: Arc<ShopQueryService<MockClock>>,
    cache: Arc<CacheService<MockClock>>,
    counter: Arc<CountingShopRepository>,
    sqlite: Arc<SqliteShopRepository>,
    _dir: TempDir,
}

fn fixture(loader_delay: Duration) -> Fixture {
    let dir = TempDir::new().expect("temp dir created");
    let manager =
        Arc::new(DbManager::new(dir.path().join("test.db"), 4).expect("manager created"));
    manager.run_migrations().expect("migrations applied");
    let sqlite = Arc::new(SqliteShopRepository::new(manager));

    let clock = MockClock::new();
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::with_clock(clock.clone()));
    let locks = Arc::new(SimpleLockProvider::new(Arc::clone(&store)));
    let cache = Arc::new(CacheService::with_clock(
        store,
        locks,
        CacheConfig::default(),
        clock.clone(),
    ));

    let counter = Arc::new(CountingShopRepository::with_delay(
        Arc::clone(&sqlite) as Arc<dyn ShopRepository>,
        loader_delay,
    ));
    let service = Arc::new(ShopQueryService::new(
        Arc::clone(&cache),
        Arc::clone(&counter) as Arc<dyn ShopRepository>,
    ));

    Fixture { clock, service, cache, counter, sqlite, _dir: dir }
}

fn sample_shop(id: i64, name: &str) -> Shop {
    Shop { id, name: name.into(), address: "1 Main St".into(), avg_price: 80, score: 45 }
}

/// Repeated lookups for a nonexistent id hit the loader at most once while
/// the null-marker lives.
#[tokio::test(flavor = "multi_thread")]
async fn null_marker_stops_cache_penetration() {
    let fx = fixture(Duration::ZERO);

    assert!(fx.service.query_by_id_passthrough(404).await.unwrap().is_none());
    assert!(fx.service.query_by_id_passthrough(404).await.unwrap().is_none());
    assert_eq!(fx.counter.loads(), 1, "second miss must be absorbed by the null-marker");

    // Once the marker's short TTL lapses, the loader is consulted again
    fx.clock.advance_secs(CacheConfig::default().null_ttl_secs + 1);
    assert!(fx.service.query_by_id_passthrough(404).await.unwrap().is_none());
    assert_eq!(fx.counter.loads(), 2);
}

/// A passthrough hit is cached for subsequent reads.
#[tokio::test(flavor = "multi_thread")]
async fn passthrough_caches_loaded_entities() {
    let fx = fixture(Duration::ZERO);
    fx.sqlite.insert(&sample_shop(7, "Harbor Deli")).await.unwrap();

    let first = fx.service.query_by_id_passthrough(7).await.unwrap().expect("shop found");
    let second = fx.service.query_by_id_passthrough(7).await.unwrap().expect("shop found");
    assert_eq!(first, second);
    assert_eq!(fx.counter.loads(), 1);
}

/// 50 readers on a just-expired entry: one rebuild, everyone serves stale.
#[tokio::test(flavor = "multi_thread")]
async fn stampede_on_expired_entry_triggers_exactly_one_rebuild() {
    const READERS: usize = 50;

    // The slow loader keeps the rebuild in flight while all readers pass
    let fx = fixture(Duration::from_millis(250));
    fx.sqlite.insert(&sample_shop(7, "Before")).await.unwrap();
    fx.service.warm_shop(7).await.unwrap();
    assert_eq!(fx.counter.loads(), 1, "warming counts as one load");

    // Entry expires; the backing row moves on
    fx.sqlite.insert(&sample_shop(7, "After")).await.unwrap();
    fx.clock.advance_secs(21 * 60);

    let mut readers = JoinSet::new();
    for _ in 0..READERS {
        let service = Arc::clone(&fx.service);
        readers.spawn(async move { service.query_by_id(7).await });
    }

    let mut stale_served = 0usize;
    while let Some(result) = readers.join_next().await {
        let shop = result.unwrap().expect("reader succeeds");
        assert_eq!(shop.name, "Before", "readers must get the stale value, not block");
        stale_served += 1;
    }
    assert_eq!(stale_served, READERS);

    // Drain the rebuild pool, then confirm a single loader invocation
    fx.cache.close().await;
    assert_eq!(fx.counter.loads(), 2, "exactly one rebuild on top of the warming load");

    let refreshed = fx.service.query_by_id(7).await.expect("rebuilt entry");
    assert_eq!(refreshed.name, "After");
}

/// The logical-expiration policy never lazily creates entries.
#[tokio::test(flavor = "multi_thread")]
async fn logical_expiration_misses_do_not_invoke_loader() {
    let fx = fixture(Duration::ZERO);
    fx.sqlite.insert(&sample_shop(7, "Harbor Deli")).await.unwrap();

    // Not warmed: a logical-expiration read reports not-found
    let result = fx.service.query_by_id(7).await;
    assert!(result.is_err(), "unwarmed entry must be a not-found");
    assert_eq!(fx.counter.loads(), 0);
}
