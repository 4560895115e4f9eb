//! SQLite-backed voucher metadata and durable stock.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use flashmart_core::repositories::VoucherRepository;
use flashmart_domain::{FlashMartError, Result, SeckillVoucher};
use rusqlite::{params, OptionalExtension};
use tokio::task;

use super::manager::DbManager;
use super::{map_join_error, map_sql_error};

pub struct SqliteVoucherRepository {
    db: Arc<DbManager>,
}

impl SqliteVoucherRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl VoucherRepository for SqliteVoucherRepository {
    async fn insert(&self, voucher: &SeckillVoucher) -> Result<()> {
        let db = Arc::clone(&self.db);
        let voucher = voucher.clone();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            conn.execute(
                "INSERT OR REPLACE INTO seckill_voucher
                     (id, shop_id, title, stock, begin_time, end_time)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    voucher.id,
                    voucher.shop_id,
                    voucher.title,
                    voucher.stock,
                    voucher.begin_time.timestamp(),
                    voucher.end_time.timestamp(),
                ],
            )
            .map(|_| ())
            .map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<SeckillVoucher>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<Option<SeckillVoucher>> {
            let conn = db.get_connection()?;
            let row: Option<(i64, i64, String, i64, i64, i64)> = conn
                .query_row(
                    "SELECT id, shop_id, title, stock, begin_time, end_time
                     FROM seckill_voucher WHERE id = ?1",
                    params![id],
                    |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                        ))
                    },
                )
                .optional()
                .map_err(map_sql_error)?;

            row.map(|(id, shop_id, title, stock, begin, end)| {
                let begin_time = timestamp(begin, id)?;
                let end_time = timestamp(end, id)?;
                Ok(SeckillVoucher { id, shop_id, title, stock, begin_time, end_time })
            })
            .transpose()
        })
        .await
        .map_err(map_join_error)?
    }

    async fn stock(&self, id: i64) -> Result<Option<i64>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<Option<i64>> {
            let conn = db.get_connection()?;
            conn.query_row(
                "SELECT stock FROM seckill_voucher WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()
            .map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }
}

fn timestamp(secs: i64, voucher_id: i64) -> Result<chrono::DateTime<chrono::Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| {
        FlashMartError::Persistence(format!("voucher {voucher_id} carries an invalid timestamp"))
    })
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    async fn setup() -> (SqliteVoucherRepository, TempDir) {
        let temp_dir = TempDir::new().expect("temp dir created");
        let manager =
            Arc::new(DbManager::new(temp_dir.path().join("test.db"), 4).expect("manager created"));
        manager.run_migrations().expect("migrations applied");
        (SqliteVoucherRepository::new(manager), temp_dir)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn insert_and_find_round_trip() {
        let (vouchers, _dir) = setup().await;
        let voucher = SeckillVoucher {
            id: 3,
            shop_id: 7,
            title: "Lunch special".into(),
            stock: 100,
            begin_time: DateTime::from_timestamp(1_754_000_000, 0).unwrap(),
            end_time: DateTime::from_timestamp(1_764_000_000, 0).unwrap(),
        };

        vouchers.insert(&voucher).await.expect("insert succeeds");
        assert_eq!(vouchers.find_by_id(3).await.expect("query succeeds"), Some(voucher));
        assert_eq!(vouchers.stock(3).await.expect("query succeeds"), Some(100));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stock_of_missing_voucher_is_none() {
        let (vouchers, _dir) = setup().await;
        assert_eq!(vouchers.stock(404).await.expect("query succeeds"), None);
    }
}
