use crate::domain::value_objects::UserSession;

/// Supplies the current authenticated session. `None` means no session
/// cookie is present; the core treats that as "no connection possible"
/// and never retries it.
pub trait AuthContext: Send + Sync {
    fn current_session(&self) -> Option<UserSession>;
}
