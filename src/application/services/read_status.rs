use crate::application::ports::{AuthContext, ReadStatusRepository};
use crate::domain::entities::{Notification, NotificationPayload};
use crate::shared::error::AppError;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Local read-status overlay, keyed by the authenticated user. Storage
/// trouble on the read path degrades to an empty map; only explicit writes
/// surface errors to the caller.
#[derive(Clone)]
pub struct ReadStatusService {
    repository: Arc<dyn ReadStatusRepository>,
    auth: Arc<dyn AuthContext>,
}

impl ReadStatusService {
    pub fn new(repository: Arc<dyn ReadStatusRepository>, auth: Arc<dyn AuthContext>) -> Self {
        Self { repository, auth }
    }

    pub async fn get_all(&self) -> HashMap<String, bool> {
        let Some(session) = self.auth.current_session() else {
            return HashMap::new();
        };
        match self.repository.load(&session.user_id).await {
            Ok(map) => map,
            Err(err) => {
                warn!("Read-status cache unavailable; treating as empty: {err}");
                HashMap::new()
            }
        }
    }

    pub async fn get(&self, notification_id: &str) -> Option<bool> {
        self.get_all().await.get(notification_id).copied()
    }

    pub async fn set(&self, notification_id: &str, is_read: bool) -> Result<(), AppError> {
        let session = self
            .auth
            .current_session()
            .ok_or_else(|| AppError::Auth("No active session".to_string()))?;
        self.repository
            .set(&session.user_id, notification_id, is_read)
            .await
    }

    pub async fn set_many(
        &self,
        notification_ids: &[String],
        is_read: bool,
    ) -> Result<(), AppError> {
        let session = self
            .auth
            .current_session()
            .ok_or_else(|| AppError::Auth("No active session".to_string()))?;
        self.repository
            .set_many(&session.user_id, notification_ids, is_read)
            .await
    }

    /// Applies the overlay to freshly fetched or pushed payloads: the cached
    /// value wins, then the server hint, then unread.
    pub async fn overlay(&self, payloads: Vec<NotificationPayload>) -> Vec<Notification> {
        let cache = self.get_all().await;
        payloads
            .into_iter()
            .map(|payload| {
                let cached = cache.get(&payload.id).copied();
                Notification::from_payload(payload, cached)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::NotificationKind;
    use crate::domain::value_objects::{UserRole, UserSession};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex as StdMutex;

    struct FixedAuth(Option<UserSession>);

    impl AuthContext for FixedAuth {
        fn current_session(&self) -> Option<UserSession> {
            self.0.clone()
        }
    }

    struct MapRepository {
        map: StdMutex<HashMap<String, bool>>,
        fail_reads: bool,
    }

    impl MapRepository {
        fn new(map: HashMap<String, bool>) -> Self {
            Self {
                map: StdMutex::new(map),
                fail_reads: false,
            }
        }

        fn corrupt() -> Self {
            Self {
                map: StdMutex::new(HashMap::new()),
                fail_reads: true,
            }
        }
    }

    #[async_trait]
    impl ReadStatusRepository for MapRepository {
        async fn load(&self, _user_id: &str) -> Result<HashMap<String, bool>, AppError> {
            if self.fail_reads {
                return Err(AppError::Database("malformed row".to_string()));
            }
            Ok(self.map.lock().unwrap().clone())
        }

        async fn set(
            &self,
            _user_id: &str,
            notification_id: &str,
            is_read: bool,
        ) -> Result<(), AppError> {
            self.map
                .lock()
                .unwrap()
                .insert(notification_id.to_string(), is_read);
            Ok(())
        }

        async fn set_many(
            &self,
            _user_id: &str,
            notification_ids: &[String],
            is_read: bool,
        ) -> Result<(), AppError> {
            let mut map = self.map.lock().unwrap();
            for id in notification_ids {
                map.insert(id.clone(), is_read);
            }
            Ok(())
        }
    }

    fn payload(id: &str, is_read: Option<bool>) -> NotificationPayload {
        NotificationPayload {
            id: id.to_string(),
            title: "t".to_string(),
            message: "m".to_string(),
            course_id: "c".to_string(),
            created_by_id: "u".to_string(),
            created_by_name: "U".to_string(),
            created_at: Utc::now(),
            kind: NotificationKind::System,
            is_read,
            target_user_id: None,
            target_role: None,
        }
    }

    fn service(repository: MapRepository) -> ReadStatusService {
        ReadStatusService::new(
            Arc::new(repository),
            Arc::new(FixedAuth(Some(UserSession::new("user-1", UserRole::Student)))),
        )
    }

    #[tokio::test]
    async fn overlay_prefers_cached_value_over_server_hint() {
        let service = service(MapRepository::new(HashMap::from([(
            "5".to_string(),
            true,
        )])));

        let merged = service
            .overlay(vec![payload("5", Some(false)), payload("6", Some(true))])
            .await;

        assert!(merged[0].is_read, "cache overlay must win");
        assert!(merged[1].is_read, "server hint applies when uncached");
    }

    #[tokio::test]
    async fn corrupt_storage_reads_as_empty() {
        let service = service(MapRepository::corrupt());
        assert!(service.get_all().await.is_empty());

        let merged = service.overlay(vec![payload("1", None)]).await;
        assert!(!merged[0].is_read);
    }

    #[tokio::test]
    async fn set_requires_a_session() {
        let service = ReadStatusService::new(
            Arc::new(MapRepository::new(HashMap::new())),
            Arc::new(FixedAuth(None)),
        );
        assert!(service.set("1", true).await.is_err());
    }
}
