#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use coursehub_notify::application::ports::{
    NotificationApi, NotificationTransport, TransportEvent,
};
use coursehub_notify::domain::entities::{CourseRef, NotificationKind, NotificationPayload};
use coursehub_notify::domain::value_objects::UserSession;
use coursehub_notify::shared::error::AppError;
use coursehub_notify::AppConfig;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

/// Transport that always connects and records every hub invoke. Pushes are
/// injected through `emit`.
pub struct ScriptedTransport {
    pub invoked: Mutex<Vec<String>>,
    pub history: Mutex<HashMap<String, Vec<NotificationPayload>>>,
    events_tx: broadcast::Sender<TransportEvent>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        let (events_tx, _) = broadcast::channel(32);
        Self {
            invoked: Mutex::new(Vec::new()),
            history: Mutex::new(HashMap::new()),
            events_tx,
        }
    }

    pub fn emit(&self, payload: NotificationPayload) {
        let _ = self
            .events_tx
            .send(TransportEvent::Notification(payload));
    }

    pub fn emit_closed(&self, reason: Option<&str>) {
        let _ = self.events_tx.send(TransportEvent::Closed {
            reason: reason.map(str::to_string),
        });
    }

    pub fn invoked_methods(&self) -> Vec<String> {
        self.invoked.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationTransport for ScriptedTransport {
    async fn connect(&self, _session: &UserSession) -> Result<(), AppError> {
        Ok(())
    }

    async fn disconnect(&self) {}

    async fn invoke(&self, method: &str, args: Value) -> Result<Value, AppError> {
        self.invoked.lock().unwrap().push(method.to_string());
        if method == "GetCourseNotifications" {
            let course_id = args["courseId"].as_str().unwrap_or_default().to_string();
            let history = self.history.lock().unwrap();
            let payloads = history.get(&course_id).cloned().unwrap_or_default();
            return Ok(serde_json::to_value(payloads)?);
        }
        Ok(Value::Null)
    }

    fn events(&self) -> broadcast::Receiver<TransportEvent> {
        self.events_tx.subscribe()
    }
}

/// API fake with canned rosters and per-course notification lists.
pub struct ScriptedApi {
    pub courses: Vec<CourseRef>,
    pub by_course: HashMap<String, Vec<NotificationPayload>>,
    pub unread: u64,
    pub marked_read: Mutex<Vec<String>>,
}

impl ScriptedApi {
    pub fn new(courses: Vec<CourseRef>) -> Self {
        Self {
            courses,
            by_course: HashMap::new(),
            unread: 0,
            marked_read: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl NotificationApi for ScriptedApi {
    async fn fetch_enrolled_courses(&self) -> Result<Vec<CourseRef>, AppError> {
        Ok(self.courses.clone())
    }

    async fn fetch_course_notifications(
        &self,
        course_id: &str,
    ) -> Result<Vec<NotificationPayload>, AppError> {
        Ok(self.by_course.get(course_id).cloned().unwrap_or_default())
    }

    async fn fetch_all_notifications(&self) -> Result<Vec<NotificationPayload>, AppError> {
        Ok(self.by_course.values().flatten().cloned().collect())
    }

    async fn fetch_unread_count(&self) -> Result<u64, AppError> {
        Ok(self.unread)
    }

    async fn mark_read(&self, notification_id: &str) -> Result<(), AppError> {
        self.marked_read
            .lock()
            .unwrap()
            .push(notification_id.to_string());
        Ok(())
    }

    async fn mark_all_read(&self, _course_id: &str) -> Result<(), AppError> {
        Ok(())
    }

    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }
}

pub fn course(id: &str, name: &str) -> CourseRef {
    CourseRef {
        course_id: id.to_string(),
        course_name: name.to_string(),
    }
}

pub fn payload(id: &str, course_id: &str, minute: u32) -> NotificationPayload {
    NotificationPayload {
        id: id.to_string(),
        title: format!("title {id}"),
        message: "body".to_string(),
        course_id: course_id.to_string(),
        created_by_id: "teacher-1".to_string(),
        created_by_name: "Prof. Ada".to_string(),
        created_at: Utc.with_ymd_and_hms(2025, 6, 1, 10, minute, 0).unwrap(),
        kind: NotificationKind::Announcement,
        is_read: Some(false),
        target_user_id: None,
        target_role: None,
    }
}

/// Config tuned for tests: no attempt spacing, short delays.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.channel.min_attempt_spacing_ms = 0;
    config.channel.base_reconnect_delay_ms = 5;
    config.channel.max_reconnect_delay_ms = 40;
    config.channel.rate_limit_base_delay_ms = 20;
    config.notifications.unread_debounce_ms = 0;
    config
}
