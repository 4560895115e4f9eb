//! Flash-sale order admission pipeline
//!
//! `SeckillService` runs the atomic admission check and enqueues admitted
//! requests; `OrderConsumer` is the single background task that dequeues,
//! guards, persists and acknowledges them, with pending-list recovery giving
//! effectively-once order creation across crashes.

mod consumer;
mod service;

pub use consumer::OrderConsumer;
pub use service::SeckillService;
