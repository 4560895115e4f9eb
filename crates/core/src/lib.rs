//! # FlashMart Core
//!
//! Coordination primitives and flash-sale services over a shared
//! key-value/stream store.
//!
//! The store itself is an external collaborator reached through the ports in
//! [`store_ports`]; relational persistence sits behind the ports in
//! [`repositories`]. The four components live here:
//!
//! - [`lock`]: distributed mutual exclusion with token-checked release
//! - [`id`]: globally unique, roughly time-ordered ID generation
//! - [`cache`]: cache-aside reads with penetration and stampede guards
//! - [`seckill`]: flash-sale admission, durable queueing and the
//!   crash-safe order consumer

pub mod cache;
pub mod id;
pub mod lock;
pub mod repositories;
pub mod seckill;
pub mod shop;
pub mod store_ports;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::CacheService;
pub use id::IdGenerator;
pub use lock::{LockProvider, LockToken, RenewingLockProvider, SimpleLockProvider};
pub use seckill::{OrderConsumer, SeckillService};
pub use shop::ShopQueryService;
pub use store_ports::{AdmissionStore, KeyValueStore, ReadCursor, StreamEntry, StreamStore};
