use crate::application::ports::{ReadStatusRepository, SubscriptionRepository};
use crate::domain::entities::CourseSubscription;
use crate::shared::error::AppError;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory stand-ins for the SQLite repositories. Same per-user keying,
/// no durability; meant for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemorySubscriptionRepository {
    records: RwLock<HashMap<(String, String), CourseSubscription>>,
}

impl MemorySubscriptionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionRepository for MemorySubscriptionRepository {
    async fn find(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<Option<CourseSubscription>, AppError> {
        let records = self.records.read().await;
        Ok(records
            .get(&(user_id.to_string(), course_id.to_string()))
            .cloned())
    }

    async fn upsert(
        &self,
        user_id: &str,
        subscription: &CourseSubscription,
    ) -> Result<(), AppError> {
        let mut records = self.records.write().await;
        records.insert(
            (user_id.to_string(), subscription.course_id.clone()),
            subscription.clone(),
        );
        Ok(())
    }

    async fn list(&self, user_id: &str) -> Result<Vec<CourseSubscription>, AppError> {
        let records = self.records.read().await;
        let mut result: Vec<CourseSubscription> = records
            .iter()
            .filter(|((uid, _), _)| uid == user_id)
            .map(|(_, record)| record.clone())
            .collect();
        result.sort_by(|a, b| a.course_id.cmp(&b.course_id));
        Ok(result)
    }
}

#[derive(Default)]
pub struct MemoryReadStatusRepository {
    statuses: RwLock<HashMap<String, HashMap<String, bool>>>,
}

impl MemoryReadStatusRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReadStatusRepository for MemoryReadStatusRepository {
    async fn load(&self, user_id: &str) -> Result<HashMap<String, bool>, AppError> {
        let statuses = self.statuses.read().await;
        Ok(statuses.get(user_id).cloned().unwrap_or_default())
    }

    async fn set(
        &self,
        user_id: &str,
        notification_id: &str,
        is_read: bool,
    ) -> Result<(), AppError> {
        let mut statuses = self.statuses.write().await;
        statuses
            .entry(user_id.to_string())
            .or_default()
            .insert(notification_id.to_string(), is_read);
        Ok(())
    }

    async fn set_many(
        &self,
        user_id: &str,
        notification_ids: &[String],
        is_read: bool,
    ) -> Result<(), AppError> {
        let mut statuses = self.statuses.write().await;
        let user_map = statuses.entry(user_id.to_string()).or_default();
        for id in notification_ids {
            user_map.insert(id.clone(), is_read);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriptions_are_keyed_per_user() {
        let repo = MemorySubscriptionRepository::new();
        let record = CourseSubscription::new("c1", None, true);
        repo.upsert("alice", &record).await.unwrap();

        assert!(repo.find("alice", "c1").await.unwrap().is_some());
        assert!(repo.find("bob", "c1").await.unwrap().is_none());
        assert_eq!(repo.list("alice").await.unwrap().len(), 1);
        assert!(repo.list("bob").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn read_statuses_are_keyed_per_user() {
        let repo = MemoryReadStatusRepository::new();
        repo.set("alice", "n1", true).await.unwrap();

        assert_eq!(repo.load("alice").await.unwrap().get("n1"), Some(&true));
        assert!(repo.load("bob").await.unwrap().is_empty());
    }
}
