//! SQLite persistence behind the repository ports
//!
//! Connections come from an r2d2 pool; every call crosses into
//! `spawn_blocking` so the async runtime never parks on database I/O.

mod manager;
mod order_repository;
mod shop_repository;
mod voucher_repository;

pub use manager::DbManager;
pub use order_repository::SqliteOrderRepository;
pub use shop_repository::SqliteShopRepository;
pub use voucher_repository::SqliteVoucherRepository;

use flashmart_domain::FlashMartError;
use tokio::task::JoinError;

pub(crate) fn map_sql_error(err: rusqlite::Error) -> FlashMartError {
    FlashMartError::Persistence(err.to_string())
}

pub(crate) fn map_join_error(err: JoinError) -> FlashMartError {
    if err.is_cancelled() {
        FlashMartError::Internal("database task cancelled".into())
    } else {
        FlashMartError::Internal(format!("database task panic: {err}"))
    }
}
