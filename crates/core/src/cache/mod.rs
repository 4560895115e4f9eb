//! Cache-aside engine
//!
//! Generic get-or-populate over the shared store with two consistency
//! policies: passthrough (null-caching, guards against penetration) and
//! logical expiration (stale-serving with a lock-guarded background rebuild,
//! guards against breakdown/thundering-herd).

mod service;

pub use service::CacheService;
