use crate::domain::entities::CourseSubscription;
use crate::shared::error::AppError;
use async_trait::async_trait;
use std::collections::HashMap;

/// Durable per-user course subscription records.
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn find(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<Option<CourseSubscription>, AppError>;

    async fn upsert(
        &self,
        user_id: &str,
        subscription: &CourseSubscription,
    ) -> Result<(), AppError>;

    async fn list(&self, user_id: &str) -> Result<Vec<CourseSubscription>, AppError>;
}

/// Durable per-user notification read-status overlay. A backup of server
/// state, never the sole source of truth.
#[async_trait]
pub trait ReadStatusRepository: Send + Sync {
    async fn load(&self, user_id: &str) -> Result<HashMap<String, bool>, AppError>;

    async fn set(
        &self,
        user_id: &str,
        notification_id: &str,
        is_read: bool,
    ) -> Result<(), AppError>;

    async fn set_many(
        &self,
        user_id: &str,
        notification_ids: &[String],
        is_read: bool,
    ) -> Result<(), AppError>;
}
