use crate::application::ports::NotificationApi;
use crate::domain::entities::{CourseRef, NotificationPayload};
use crate::shared::config::ApiConfig;
use crate::shared::error::AppError;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// REST gateway to the platform backend. Sessions ride on cookies, so the
/// client is built with a cookie store and shared with the login flow.
#[derive(Clone)]
pub struct HttpNotificationGateway {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct UnreadCountResponse {
    count: u64,
}

impl HttpNotificationGateway {
    pub fn new(config: &ApiConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_millis(config.probe_timeout_ms.max(1000)))
            .build()?;
        Ok(Self::with_client(client, &config.base_url))
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Maps throttling responses to the typed error before the generic
    /// status check, so callers can react to rate limiting specifically.
    fn check_status(response: Response) -> Result<Response, AppError> {
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(AppError::RateLimited(
                "Server returned 429 Too Many Requests".to_string(),
            ));
        }
        Ok(response.error_for_status()?)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, AppError> {
        let response = self.client.get(self.url(path)).send().await?;
        let response = Self::check_status(response)?;
        Ok(response.json().await?)
    }

    async fn post_empty(&self, path: &str) -> Result<(), AppError> {
        let response = self.client.post(self.url(path)).send().await?;
        Self::check_status(response)?;
        Ok(())
    }
}

#[async_trait]
impl NotificationApi for HttpNotificationGateway {
    async fn fetch_enrolled_courses(&self) -> Result<Vec<CourseRef>, AppError> {
        self.get_json("/api/courses/enrolled").await
    }

    async fn fetch_course_notifications(
        &self,
        course_id: &str,
    ) -> Result<Vec<NotificationPayload>, AppError> {
        debug!("Fetching notifications for course {course_id}");
        self.get_json(&format!("/api/courses/{course_id}/notifications"))
            .await
    }

    async fn fetch_all_notifications(&self) -> Result<Vec<NotificationPayload>, AppError> {
        self.get_json("/api/notifications").await
    }

    async fn fetch_unread_count(&self) -> Result<u64, AppError> {
        let response: UnreadCountResponse = self.get_json("/api/notifications/unread-count").await?;
        Ok(response.count)
    }

    async fn mark_read(&self, notification_id: &str) -> Result<(), AppError> {
        self.post_empty(&format!("/api/notifications/{notification_id}/read"))
            .await
    }

    async fn mark_all_read(&self, course_id: &str) -> Result<(), AppError> {
        self.post_empty(&format!("/api/courses/{course_id}/notifications/read"))
            .await
    }

    async fn health_check(&self) -> Result<(), AppError> {
        let response = self.client.get(self.url("/api/health")).send().await?;
        Self::check_status(response)?;
        Ok(())
    }
}
