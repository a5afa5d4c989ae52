use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UserRole {
    Student,
    Instructor,
    Admin,
}

impl UserRole {
    /// Instructors and admins get the single "all notifications" fetch path.
    pub fn sees_all_courses(&self) -> bool {
        matches!(self, UserRole::Instructor | UserRole::Admin)
    }
}

/// The authenticated session the core operates under. Absence of a session
/// (no cookie) means no connection is possible for the rest of the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSession {
    pub user_id: String,
    pub role: UserRole,
}

impl UserSession {
    pub fn new(user_id: impl Into<String>, role: UserRole) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }
}
