use crate::application::ports::SubscriptionRepository;
use crate::domain::entities::CourseSubscription;
use crate::infrastructure::database::connection_pool::ConnectionPool;
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

#[derive(Clone)]
pub struct SqliteSubscriptionRepository {
    pool: ConnectionPool,
}

impl SqliteSubscriptionRepository {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &SqlitePool {
        self.pool.pool()
    }

    fn row_to_record(row: SqliteRow) -> CourseSubscription {
        let subscribed: i64 = row.get("subscribed");
        CourseSubscription {
            course_id: row.get("course_id"),
            course_name: row.get("course_name"),
            subscribed: subscribed != 0,
            updated_at: row.get("updated_at"),
        }
    }
}

#[async_trait]
impl SubscriptionRepository for SqliteSubscriptionRepository {
    async fn find(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<Option<CourseSubscription>, AppError> {
        let row = sqlx::query(
            r#"
            SELECT course_id, course_name, subscribed, updated_at
            FROM course_subscriptions
            WHERE user_id = ?1 AND course_id = ?2
            "#,
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(Self::row_to_record))
    }

    async fn upsert(
        &self,
        user_id: &str,
        subscription: &CourseSubscription,
    ) -> Result<(), AppError> {
        let now_ms = Utc::now().timestamp_millis();

        sqlx::query(
            r#"
            INSERT INTO course_subscriptions (
                user_id,
                course_id,
                course_name,
                subscribed,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            ON CONFLICT(user_id, course_id) DO UPDATE SET
                course_name = COALESCE(excluded.course_name, course_name),
                subscribed = excluded.subscribed,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(&subscription.course_id)
        .bind(subscription.course_name.clone())
        .bind(subscription.subscribed as i64)
        .bind(now_ms)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    async fn list(&self, user_id: &str) -> Result<Vec<CourseSubscription>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT course_id, course_name, subscribed, updated_at
            FROM course_subscriptions
            WHERE user_id = ?1
            ORDER BY course_id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(Self::row_to_record).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn repository() -> SqliteSubscriptionRepository {
        let pool = ConnectionPool::in_memory().await.unwrap();
        SqliteSubscriptionRepository::new(pool)
    }

    #[tokio::test]
    async fn upsert_then_find_round_trips() {
        let repo = repository().await;
        let record = CourseSubscription::new("c1", Some("Algebra".to_string()), true);
        repo.upsert("user-1", &record).await.unwrap();

        let found = repo.find("user-1", "c1").await.unwrap().unwrap();
        assert_eq!(found.course_id, "c1");
        assert_eq!(found.course_name.as_deref(), Some("Algebra"));
        assert!(found.subscribed);
    }

    #[tokio::test]
    async fn upsert_flips_state_and_keeps_the_name() {
        let repo = repository().await;
        repo.upsert(
            "user-1",
            &CourseSubscription::new("c1", Some("Algebra".to_string()), true),
        )
        .await
        .unwrap();
        // A toggle without a name must not erase the stored one.
        repo.upsert("user-1", &CourseSubscription::new("c1", None, false))
            .await
            .unwrap();

        let found = repo.find("user-1", "c1").await.unwrap().unwrap();
        assert!(!found.subscribed);
        assert_eq!(found.course_name.as_deref(), Some("Algebra"));
    }

    #[tokio::test]
    async fn list_is_scoped_to_the_user() {
        let repo = repository().await;
        repo.upsert("alice", &CourseSubscription::new("c2", None, true))
            .await
            .unwrap();
        repo.upsert("alice", &CourseSubscription::new("c1", None, false))
            .await
            .unwrap();
        repo.upsert("bob", &CourseSubscription::new("c3", None, true))
            .await
            .unwrap();

        let listed = repo.list("alice").await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|r| r.course_id.as_str()).collect();
        assert_eq!(ids, ["c1", "c2"]);
    }
}
