use crate::application::ports::ReadStatusRepository;
use crate::infrastructure::database::connection_pool::ConnectionPool;
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

#[derive(Clone)]
pub struct SqliteReadStatusRepository {
    pool: ConnectionPool,
}

impl SqliteReadStatusRepository {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &SqlitePool {
        self.pool.pool()
    }
}

#[async_trait]
impl ReadStatusRepository for SqliteReadStatusRepository {
    async fn load(&self, user_id: &str) -> Result<HashMap<String, bool>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT notification_id, is_read
            FROM notification_read_status
            WHERE user_id = ?1
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let is_read: i64 = row.get("is_read");
                (row.get("notification_id"), is_read != 0)
            })
            .collect())
    }

    async fn set(
        &self,
        user_id: &str,
        notification_id: &str,
        is_read: bool,
    ) -> Result<(), AppError> {
        let now_ms = Utc::now().timestamp_millis();

        sqlx::query(
            r#"
            INSERT INTO notification_read_status (user_id, notification_id, is_read, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(user_id, notification_id) DO UPDATE SET
                is_read = excluded.is_read,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(notification_id)
        .bind(is_read as i64)
        .bind(now_ms)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    async fn set_many(
        &self,
        user_id: &str,
        notification_ids: &[String],
        is_read: bool,
    ) -> Result<(), AppError> {
        let now_ms = Utc::now().timestamp_millis();
        let mut tx = self.pool().begin().await?;

        for notification_id in notification_ids {
            sqlx::query(
                r#"
                INSERT INTO notification_read_status (user_id, notification_id, is_read, updated_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(user_id, notification_id) DO UPDATE SET
                    is_read = excluded.is_read,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(user_id)
            .bind(notification_id)
            .bind(is_read as i64)
            .bind(now_ms)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn repository() -> SqliteReadStatusRepository {
        let pool = ConnectionPool::in_memory().await.unwrap();
        SqliteReadStatusRepository::new(pool)
    }

    #[tokio::test]
    async fn set_then_load_round_trips() {
        let repo = repository().await;
        repo.set("user-1", "n1", true).await.unwrap();
        repo.set("user-1", "n2", false).await.unwrap();

        let loaded = repo.load("user-1").await.unwrap();
        assert_eq!(loaded.get("n1"), Some(&true));
        assert_eq!(loaded.get("n2"), Some(&false));
        assert!(repo.load("user-2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn set_many_is_atomic_per_batch() {
        let repo = repository().await;
        let ids: Vec<String> = (1..=3).map(|i| format!("n{i}")).collect();
        repo.set_many("user-1", &ids, true).await.unwrap();

        let loaded = repo.load("user-1").await.unwrap();
        assert_eq!(loaded.len(), 3);
        assert!(loaded.values().all(|v| *v));
    }

    #[tokio::test]
    async fn set_overwrites_the_previous_value() {
        let repo = repository().await;
        repo.set("user-1", "n1", true).await.unwrap();
        repo.set("user-1", "n1", false).await.unwrap();

        assert_eq!(repo.load("user-1").await.unwrap().get("n1"), Some(&false));
    }
}
