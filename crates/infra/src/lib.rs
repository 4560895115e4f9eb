//! # FlashMart Infra
//!
//! Adapters behind the ports declared in `flashmart-core`:
//!
//! - [`memory`]: embedded in-memory implementation of the full store
//!   contract (key-value, admission script, streams with consumer groups)
//!   for tests and local runs; a networked Redis-style client drops in
//!   behind the same ports in production.
//! - [`database`]: SQLite persistence for shops, vouchers and orders.
//! - [`config`]: environment-first configuration loading with a TOML
//!   file fallback.

pub mod config;
pub mod database;
pub mod memory;

pub use database::{DbManager, SqliteOrderRepository, SqliteShopRepository, SqliteVoucherRepository};
pub use memory::MemoryStore;
