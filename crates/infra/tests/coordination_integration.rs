//! Lock and ID-generator behavior against the in-memory store.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use flashmart_common::MockClock;
use flashmart_core::store_ports::KeyValueStore;
use flashmart_core::{IdGenerator, LockProvider, RenewingLockProvider, SimpleLockProvider};
use flashmart_infra::MemoryStore;
use tokio::task::JoinSet;

/// A release with a stale token must not disturb the next holder's lock.
#[tokio::test]
async fn expired_lock_release_is_a_noop_for_new_holder() {
    let clock = MockClock::new();
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::with_clock(clock.clone()));
    let locks = SimpleLockProvider::new(Arc::clone(&store));
    let lease = Duration::from_secs(10);

    let stale_token = locks.try_acquire("shop:1", lease).await.unwrap().expect("first acquire");

    // Lease lapses; a second party takes the lock
    clock.advance_secs(11);
    let live_token = locks.try_acquire("shop:1", lease).await.unwrap().expect("second acquire");

    // The first party's delayed release must not delete the live lock
    locks.release("shop:1", &stale_token).await.unwrap();
    assert_eq!(
        store.get("lock:shop:1").await.unwrap().as_deref(),
        Some(live_token.as_str()),
        "second holder's lock must survive a stale release"
    );

    // And the live holder can still release normally
    locks.release("shop:1", &live_token).await.unwrap();
    assert_eq!(store.get("lock:shop:1").await.unwrap(), None);
}

/// The watchdog keeps a renewing lock alive well past its initial lease.
#[tokio::test(flavor = "multi_thread")]
async fn renewing_lock_outlives_its_initial_lease() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let holder = RenewingLockProvider::new(Arc::clone(&store));
    let challenger = SimpleLockProvider::new(Arc::clone(&store));
    let lease = Duration::from_millis(150);

    let token = holder.try_acquire("order:42", lease).await.unwrap().expect("acquired");

    // Several leases later the challenger still cannot get in
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(challenger.try_acquire("order:42", lease).await.unwrap().is_none());

    holder.release("order:42", &token).await.unwrap();
    assert!(challenger.try_acquire("order:42", lease).await.unwrap().is_some());
}

/// 100k concurrently generated IDs with one prefix are all distinct.
#[tokio::test(flavor = "multi_thread")]
async fn concurrent_ids_are_globally_unique() {
    const TASKS: usize = 50;
    const IDS_PER_TASK: usize = 2_000;

    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let ids = Arc::new(IdGenerator::new(store));

    let mut tasks = JoinSet::new();
    for _ in 0..TASKS {
        let ids = Arc::clone(&ids);
        tasks.spawn(async move {
            let mut generated = Vec::with_capacity(IDS_PER_TASK);
            for _ in 0..IDS_PER_TASK {
                generated.push(ids.next_id("order").await.unwrap());
            }
            generated
        });
    }

    let mut seen = HashSet::with_capacity(TASKS * IDS_PER_TASK);
    while let Some(batch) = tasks.join_next().await {
        for id in batch.unwrap() {
            assert!(seen.insert(id), "duplicate id generated: {id}");
        }
    }
    assert_eq!(seen.len(), TASKS * IDS_PER_TASK);
}

/// Within one second, counter order implies numeric order.
#[tokio::test]
async fn ids_within_a_second_are_strictly_increasing() {
    let clock = MockClock::new();
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::with_clock(clock.clone()));
    let ids = IdGenerator::with_clock(store, clock);

    let mut previous = ids.next_id("order").await.unwrap();
    for _ in 0..100 {
        let next = ids.next_id("order").await.unwrap();
        assert!(next > previous, "ids must increase in counter order within a second");
        previous = next;
    }
}
