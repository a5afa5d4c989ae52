use crate::domain::value_objects::session::UserRole;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationKind {
    Lesson,
    Announcement,
    Question,
    Answer,
    CourseStatus,
    System,
    #[serde(untagged)]
    Other(String),
}

/// Wire shape delivered by the backend, both on the REST fetch paths and as
/// the payload of a live push. `is_read` here is a hint, not authoritative
/// until reconciled with the local read-status cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub id: String,
    pub title: String,
    pub message: String,
    pub course_id: String,
    pub created_by_id: String,
    pub created_by_name: String,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    #[serde(default)]
    pub is_read: Option<bool>,
    #[serde(default)]
    pub target_user_id: Option<String>,
    #[serde(default)]
    pub target_role: Option<UserRole>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub title: String,
    pub message: String,
    pub course_id: String,
    pub created_by_id: String,
    pub created_by_name: String,
    pub created_at: DateTime<Utc>,
    pub kind: NotificationKind,
    pub is_read: bool,
}

impl Notification {
    /// Builds the in-memory entity from a wire payload. `cached_read` is the
    /// local read-status overlay: it wins when present, then the server hint,
    /// then unread.
    pub fn from_payload(payload: NotificationPayload, cached_read: Option<bool>) -> Self {
        let is_read = cached_read.or(payload.is_read).unwrap_or(false);
        Self {
            id: payload.id,
            title: payload.title,
            message: payload.message,
            course_id: payload.course_id,
            created_by_id: payload.created_by_id,
            created_by_name: payload.created_by_name,
            created_at: payload.created_at,
            kind: payload.kind,
            is_read,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_payload() -> serde_json::Value {
        json!({
            "id": "n-1",
            "title": "New lesson",
            "message": "Lesson 3 is available",
            "courseId": "course-10",
            "createdById": "teacher-1",
            "createdByName": "Prof. Ada",
            "createdAt": "2025-06-01T10:00:00Z",
            "type": "lesson",
            "isRead": false
        })
    }

    #[test]
    fn payload_deserializes_camel_case() {
        let payload: NotificationPayload = serde_json::from_value(sample_payload()).unwrap();
        assert_eq!(payload.id, "n-1");
        assert_eq!(payload.kind, NotificationKind::Lesson);
        assert_eq!(payload.is_read, Some(false));
        assert!(payload.target_user_id.is_none());
    }

    #[test]
    fn unknown_kind_falls_back_to_other() {
        let mut value = sample_payload();
        value["type"] = json!("grading");
        let payload: NotificationPayload = serde_json::from_value(value).unwrap();
        assert_eq!(payload.kind, NotificationKind::Other("grading".to_string()));
    }

    #[test]
    fn cache_overlay_wins_over_server_hint() {
        let payload: NotificationPayload = serde_json::from_value(sample_payload()).unwrap();
        let notification = Notification::from_payload(payload, Some(true));
        assert!(notification.is_read);
    }

    #[test]
    fn missing_read_hint_defaults_to_unread() {
        let mut value = sample_payload();
        value.as_object_mut().unwrap().remove("isRead");
        let payload: NotificationPayload = serde_json::from_value(value).unwrap();
        let notification = Notification::from_payload(payload, None);
        assert!(!notification.is_read);
    }
}
