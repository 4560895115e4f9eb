//! SQLite-backed shop rows, the backing source for the cache-aside read path.

use std::sync::Arc;

use async_trait::async_trait;
use flashmart_core::repositories::ShopRepository;
use flashmart_domain::{Result, Shop};
use rusqlite::{params, OptionalExtension};
use tokio::task;

use super::manager::DbManager;
use super::{map_join_error, map_sql_error};

pub struct SqliteShopRepository {
    db: Arc<DbManager>,
}

impl SqliteShopRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ShopRepository for SqliteShopRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Shop>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<Option<Shop>> {
            let conn = db.get_connection()?;
            conn.query_row(
                "SELECT id, name, address, avg_price, score FROM shop WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Shop {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        address: row.get(2)?,
                        avg_price: row.get(3)?,
                        score: row.get(4)?,
                    })
                },
            )
            .optional()
            .map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn insert(&self, shop: &Shop) -> Result<()> {
        let db = Arc::clone(&self.db);
        let shop = shop.clone();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            conn.execute(
                "INSERT OR REPLACE INTO shop (id, name, address, avg_price, score)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![shop.id, shop.name, shop.address, shop.avg_price, shop.score],
            )
            .map(|_| ())
            .map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    async fn setup() -> (SqliteShopRepository, TempDir) {
        let temp_dir = TempDir::new().expect("temp dir created");
        let manager =
            Arc::new(DbManager::new(temp_dir.path().join("test.db"), 4).expect("manager created"));
        manager.run_migrations().expect("migrations applied");
        (SqliteShopRepository::new(manager), temp_dir)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn insert_and_find_round_trip() {
        let (shops, _dir) = setup().await;
        let shop = Shop {
            id: 7,
            name: "Harbor Deli".into(),
            address: "12 Pier Rd".into(),
            avg_price: 45,
            score: 47,
        };

        shops.insert(&shop).await.expect("insert succeeds");
        let found = shops.find_by_id(7).await.expect("query succeeds");
        assert_eq!(found, Some(shop));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn find_missing_shop_returns_none() {
        let (shops, _dir) = setup().await;
        assert_eq!(shops.find_by_id(404).await.expect("query succeeds"), None);
    }
}
