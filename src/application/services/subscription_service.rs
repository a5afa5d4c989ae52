use crate::application::ports::{AuthContext, NotificationApi, SubscriptionRepository};
use crate::application::services::connection_manager::LiveChannelService;
use crate::domain::entities::CourseSubscription;
use crate::infrastructure::cache::TtlCache;
use crate::shared::error::AppError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Durable per-user course subscriptions plus the opt-out auto-subscribe
/// flow. Group joins/leaves ride along best-effort; the channel op failing
/// never fails the toggle itself.
#[derive(Clone)]
pub struct SubscriptionService {
    repository: Arc<dyn SubscriptionRepository>,
    api: Arc<dyn NotificationApi>,
    auth: Arc<dyn AuthContext>,
    channel: Arc<dyn LiveChannelService>,
    /// Bounds how often the enrollment roster is refetched.
    roster_cache: Arc<TtlCache<()>>,
    rejoin_running: Arc<AtomicBool>,
}

impl SubscriptionService {
    pub fn new(
        repository: Arc<dyn SubscriptionRepository>,
        api: Arc<dyn NotificationApi>,
        auth: Arc<dyn AuthContext>,
        channel: Arc<dyn LiveChannelService>,
        roster_ttl: Duration,
    ) -> Self {
        Self {
            repository,
            api,
            auth,
            channel,
            roster_cache: Arc::new(TtlCache::new(roster_ttl)),
            rejoin_running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Starts rejoining course groups after every successful (re)connect.
    /// Membership is socket-scoped on the server, so a reconnect without
    /// this leaves live pushes dead until the next login.
    pub fn start_rejoin_on_reconnect(&self) {
        if self.rejoin_running.swap(true, Ordering::SeqCst) {
            return;
        }
        let service = self.clone();
        let mut connects = self.channel.subscribe_connected();
        tokio::spawn(async move {
            loop {
                match connects.recv().await {
                    Ok(()) => service.rejoin_groups().await,
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        service.rejoin_groups().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            service.rejoin_running.store(false, Ordering::SeqCst);
        });
    }

    fn user_id(&self) -> Result<String, AppError> {
        self.auth
            .current_session()
            .map(|session| session.user_id)
            .ok_or_else(|| AppError::Auth("No active session".to_string()))
    }

    /// Defaults to false; a broken store reads as "not subscribed" rather
    /// than erroring.
    pub async fn is_subscribed(&self, course_id: &str) -> bool {
        let Ok(user_id) = self.user_id() else {
            return false;
        };
        match self.repository.find(&user_id, course_id).await {
            Ok(record) => record.map(|r| r.subscribed).unwrap_or(false),
            Err(err) => {
                warn!("Subscription lookup failed for {course_id}: {err}");
                false
            }
        }
    }

    /// Flips the subscription, creating the record on first touch. Returns
    /// the new state.
    pub async fn toggle(
        &self,
        course_id: &str,
        course_name: Option<String>,
    ) -> Result<bool, AppError> {
        let user_id = self.user_id()?;

        let record = match self.repository.find(&user_id, course_id).await? {
            Some(existing) => {
                let name = course_name.or(existing.course_name);
                CourseSubscription::new(course_id, name, !existing.subscribed)
            }
            None => CourseSubscription::new(course_id, course_name, true),
        };
        self.repository.upsert(&user_id, &record).await?;

        if record.subscribed {
            self.channel.join_group(course_id).await;
        } else {
            self.channel.leave_group(course_id).await;
        }

        Ok(record.subscribed)
    }

    pub async fn list(&self) -> Result<Vec<CourseSubscription>, AppError> {
        let user_id = self.user_id()?;
        self.repository.list(&user_id).await
    }

    pub async fn subscribed_course_ids(&self) -> Vec<String> {
        match self.list().await {
            Ok(records) => records
                .into_iter()
                .filter(|r| r.subscribed)
                .map(|r| r.course_id)
                .collect(),
            Err(err) => {
                warn!("Subscription listing failed: {err}");
                Vec::new()
            }
        }
    }

    /// Inserts a subscribed record for every enrolled/taught course that has
    /// none yet (opt-out model), joining their groups best-effort. The
    /// roster fetch is suppressed inside the cache window so repeated calls
    /// stay cheap. Returns how many records were inserted.
    pub async fn auto_subscribe(&self) -> Result<usize, AppError> {
        let user_id = self.user_id()?;

        if self.roster_cache.get(&user_id).await.is_some() {
            debug!("Course roster fetched recently; skipping auto-subscribe");
            return Ok(0);
        }

        let courses = self.api.fetch_enrolled_courses().await?;
        self.roster_cache.set(user_id.clone(), ()).await;

        let mut inserted = 0usize;
        for course in courses {
            match self.repository.find(&user_id, &course.course_id).await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(err) => {
                    warn!(
                        "Skipping auto-subscribe for {}: {err}",
                        course.course_id
                    );
                    continue;
                }
            }

            let record = CourseSubscription::new(
                course.course_id.clone(),
                Some(course.course_name.clone()),
                true,
            );
            if let Err(err) = self.repository.upsert(&user_id, &record).await {
                warn!("Failed to persist auto-subscribe for {}: {err}", course.course_id);
                continue;
            }
            self.channel.join_group(&course.course_id).await;
            inserted += 1;
        }

        debug!("Auto-subscribed to {inserted} new courses");
        Ok(inserted)
    }

    /// Joins the live-channel group of every subscribed course, used after
    /// a (re)connect.
    pub async fn rejoin_groups(&self) {
        for course_id in self.subscribed_course_ids().await {
            self.channel.join_group(&course_id).await;
        }
    }
}
