use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Per-user record of whether a course's notification channel is wanted.
/// Absence of a record means "not subscribed"; auto-subscribe inserts
/// records as subscribed by default (opt-out model).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseSubscription {
    pub course_id: String,
    pub course_name: Option<String>,
    pub subscribed: bool,
    pub updated_at: i64,
}

impl CourseSubscription {
    pub fn new(course_id: impl Into<String>, course_name: Option<String>, subscribed: bool) -> Self {
        Self {
            course_id: course_id.into(),
            course_name,
            subscribed,
            updated_at: Utc::now().timestamp_millis(),
        }
    }
}

/// A course the current user is enrolled in or teaches, as returned by the
/// enrollment API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseRef {
    pub course_id: String,
    pub course_name: String,
}
