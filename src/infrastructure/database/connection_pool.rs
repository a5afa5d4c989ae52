use crate::shared::error::AppError;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::sync::Arc;

/// Shared SQLite handle. Connecting and applying migrations happen in one
/// step, so a pool in hand always has the current schema.
#[derive(Clone)]
pub struct ConnectionPool {
    pool: Arc<SqlitePool>,
}

impl ConnectionPool {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, AppError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Ephemeral store for tests. Single connection, since every connection
    /// to `:memory:` is its own database.
    pub async fn in_memory() -> Result<Self, AppError> {
        Self::connect(":memory:", 1).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
