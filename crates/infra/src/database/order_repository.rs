//! SQLite-backed order persistence
//!
//! `create_order` is the authoritative end of the pipeline: one transaction
//! re-checks the duplicate, decrements durable stock only while positive and
//! inserts under the `(voucher_id, user_id)` unique constraint. Redelivered
//! messages resolve to `AlreadyExists` so recovery stays idempotent.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use flashmart_core::repositories::OrderRepository;
use flashmart_domain::{FlashMartError, OrderMessage, OrderOutcome, Result, VoucherOrder};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tokio::task;
use tracing::debug;

use super::manager::DbManager;
use super::{map_join_error, map_sql_error};

/// Order repository over the shared SQLite pool
pub struct SqliteOrderRepository {
    db: Arc<DbManager>,
}

impl SqliteOrderRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    fn insert_in_tx(conn: &mut Connection, message: &OrderMessage) -> Result<OrderOutcome> {
        let tx = conn.transaction().map_err(map_sql_error)?;

        let existing: i64 = tx
            .query_row(
                "SELECT COUNT(*) FROM voucher_order WHERE voucher_id = ?1 AND user_id = ?2",
                params![message.voucher_id, message.user_id],
                |row| row.get(0),
            )
            .map_err(map_sql_error)?;
        if existing > 0 {
            debug!(order_id = message.order_id, "order.duplicate_detected_at_persistence");
            return Ok(OrderOutcome::AlreadyExists);
        }

        // Conditional decrement: the rows-affected check is the durable line
        // of defense against oversell.
        let affected = tx
            .execute(
                "UPDATE seckill_voucher SET stock = stock - 1 WHERE id = ?1 AND stock > 0",
                params![message.voucher_id],
            )
            .map_err(map_sql_error)?;
        if affected == 0 {
            return Err(FlashMartError::Persistence(format!(
                "no durable stock left for voucher {}",
                message.voucher_id
            )));
        }

        let inserted = tx.execute(
            "INSERT INTO voucher_order (id, user_id, voucher_id, created_at)
             VALUES (?1, ?2, ?3, CAST(strftime('%s','now') AS INTEGER))",
            params![message.order_id, message.user_id, message.voucher_id],
        );
        match inserted {
            Ok(_) => {}
            // Lost a race with a concurrent writer: dropping the transaction
            // rolls the stock decrement back with it.
            Err(err) if is_unique_violation(&err) => {
                debug!(order_id = message.order_id, "order.unique_constraint_hit");
                return Ok(OrderOutcome::AlreadyExists);
            }
            Err(err) => return Err(map_sql_error(err)),
        }

        tx.commit().map_err(map_sql_error)?;
        Ok(OrderOutcome::Created)
    }
}

#[async_trait]
impl OrderRepository for SqliteOrderRepository {
    async fn create_order(&self, message: &OrderMessage) -> Result<OrderOutcome> {
        let db = Arc::clone(&self.db);
        let message = *message;

        task::spawn_blocking(move || -> Result<OrderOutcome> {
            let mut conn = db.get_connection()?;
            Self::insert_in_tx(&mut conn, &message)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn find_order(&self, voucher_id: i64, user_id: i64) -> Result<Option<VoucherOrder>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<Option<VoucherOrder>> {
            let conn = db.get_connection()?;
            let row: Option<(i64, i64, i64, i64)> = conn
                .query_row(
                    "SELECT id, user_id, voucher_id, created_at FROM voucher_order
                     WHERE voucher_id = ?1 AND user_id = ?2",
                    params![voucher_id, user_id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                )
                .optional()
                .map_err(map_sql_error)?;

            row.map(|(id, user_id, voucher_id, created_at)| {
                let created_at = DateTime::from_timestamp(created_at, 0).ok_or_else(|| {
                    FlashMartError::Persistence(format!(
                        "order {id} carries an invalid created_at"
                    ))
                })?;
                Ok(VoucherOrder { id, user_id, voucher_id, created_at })
            })
            .transpose()
        })
        .await
        .map_err(map_join_error)?
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}
