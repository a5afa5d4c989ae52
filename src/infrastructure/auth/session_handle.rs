use crate::application::ports::AuthContext;
use crate::domain::value_objects::UserSession;
use std::sync::RwLock;

/// Process-wide holder for the authenticated session. Login and logout swap
/// it; everything else reads it through the `AuthContext` port.
#[derive(Default)]
pub struct SessionHandle {
    session: RwLock<Option<UserSession>>,
}

impl SessionHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, session: UserSession) {
        if let Ok(mut guard) = self.session.write() {
            *guard = Some(session);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.session.write() {
            *guard = None;
        }
    }
}

impl AuthContext for SessionHandle {
    fn current_session(&self) -> Option<UserSession> {
        self.session.read().ok().and_then(|guard| guard.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::UserRole;

    #[test]
    fn set_and_clear_round_trip() {
        let handle = SessionHandle::new();
        assert!(handle.current_session().is_none());

        handle.set(UserSession::new("user-1", UserRole::Student));
        assert_eq!(
            handle.current_session().map(|s| s.user_id),
            Some("user-1".to_string())
        );

        handle.clear();
        assert!(handle.current_session().is_none());
    }
}
