use crate::domain::entities::{CourseRef, NotificationPayload};
use crate::shared::error::AppError;
use async_trait::async_trait;

/// Request/response side of the backend: enrollment roster, per-course and
/// aggregate notification fetches, the lightweight unread count, and the
/// mark-read fallbacks used when the live channel is down.
#[async_trait]
pub trait NotificationApi: Send + Sync {
    async fn fetch_enrolled_courses(&self) -> Result<Vec<CourseRef>, AppError>;

    async fn fetch_course_notifications(
        &self,
        course_id: &str,
    ) -> Result<Vec<NotificationPayload>, AppError>;

    /// Instructor/admin path: every notification visible to the user in one
    /// call.
    async fn fetch_all_notifications(&self) -> Result<Vec<NotificationPayload>, AppError>;

    async fn fetch_unread_count(&self) -> Result<u64, AppError>;

    async fn mark_read(&self, notification_id: &str) -> Result<(), AppError>;

    async fn mark_all_read(&self, course_id: &str) -> Result<(), AppError>;

    /// Cheap reachability probe for the maintain loop.
    async fn health_check(&self) -> Result<(), AppError>;
}
