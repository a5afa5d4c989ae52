use crate::application::ports::{AuthContext, NotificationApi};
use crate::application::services::connection_manager::LiveChannelService;
use crate::application::services::read_status::ReadStatusService;
use crate::application::services::subscription_service::SubscriptionService;
use crate::domain::entities::{Notification, NotificationPayload};
use crate::shared::error::AppError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, warn};

#[derive(Default)]
struct FastCount {
    last_at: Option<Instant>,
    last_value: Option<u64>,
}

/// Merges request/response fetches with live pushes into one newest-first
/// in-memory list, applies the read-status overlay, and owns the optimistic
/// mark-read flow with its rollback.
#[derive(Clone)]
pub struct NotificationService {
    api: Arc<dyn NotificationApi>,
    auth: Arc<dyn AuthContext>,
    channel: Arc<dyn LiveChannelService>,
    subscriptions: Arc<SubscriptionService>,
    read_status: Arc<ReadStatusService>,
    notifications: Arc<RwLock<Vec<Notification>>>,
    fast_count: Arc<Mutex<FastCount>>,
    unread_debounce: Duration,
    intake_running: Arc<AtomicBool>,
}

impl NotificationService {
    pub fn new(
        api: Arc<dyn NotificationApi>,
        auth: Arc<dyn AuthContext>,
        channel: Arc<dyn LiveChannelService>,
        subscriptions: Arc<SubscriptionService>,
        read_status: Arc<ReadStatusService>,
        unread_debounce: Duration,
    ) -> Self {
        Self {
            api,
            auth,
            channel,
            subscriptions,
            read_status,
            notifications: Arc::new(RwLock::new(Vec::new())),
            fast_count: Arc::new(Mutex::new(FastCount::default())),
            unread_debounce,
            intake_running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.notifications.read().await.clone()
    }

    /// Derived unread count over the in-memory list.
    pub async fn unread_count(&self) -> usize {
        self.notifications
            .read()
            .await
            .iter()
            .filter(|n| !n.is_read)
            .count()
    }

    /// Full request/response load, independent of the live channel.
    /// Instructors and admins get the single aggregate fetch, with the
    /// per-course fan-out as fallback; everyone else fans out per subscribed
    /// course. The in-memory list is replaced atomically on success.
    pub async fn load_immediate(&self) -> Result<(), AppError> {
        let session = self
            .auth
            .current_session()
            .ok_or_else(|| AppError::Auth("No active session".to_string()))?;

        let payloads = if session.role.sees_all_courses() {
            match self.api.fetch_all_notifications().await {
                Ok(payloads) => payloads,
                Err(err) => {
                    warn!("Aggregate notification fetch failed, falling back per course: {err}");
                    self.fetch_per_course().await?
                }
            }
        } else {
            self.fetch_per_course().await?
        };

        let mut merged = self.read_status.overlay(payloads).await;
        merged.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut guard = self.notifications.write().await;
        *guard = merged;
        Ok(())
    }

    /// Per-course fan-out. Individual course failures are isolated; only
    /// every fetch failing is an error, so prior state survives a total
    /// outage.
    async fn fetch_per_course(&self) -> Result<Vec<NotificationPayload>, AppError> {
        let course_ids = self.subscriptions.subscribed_course_ids().await;
        if course_ids.is_empty() {
            return Ok(Vec::new());
        }

        let results = futures::future::join_all(course_ids.iter().map(|course_id| async move {
            (
                course_id.clone(),
                self.api.fetch_course_notifications(course_id).await,
            )
        }))
        .await;

        let total = results.len();
        let mut payloads = Vec::new();
        let mut failures = 0usize;
        for (course_id, result) in results {
            match result {
                Ok(mut fetched) => payloads.append(&mut fetched),
                Err(err) => {
                    failures += 1;
                    warn!("Notification fetch failed for course {course_id}: {err}");
                }
            }
        }

        if failures == total {
            return Err(AppError::Network(
                "All course notification fetches failed".to_string(),
            ));
        }
        Ok(payloads)
    }

    /// Re-fetches one course and splices it into state; without a course id
    /// this is `load_immediate`. When the direct fetch fails and the channel
    /// is ready, course history is pulled over the channel instead.
    pub async fn refresh(&self, course_id: Option<&str>) -> Result<(), AppError> {
        let Some(course_id) = course_id else {
            return self.load_immediate().await;
        };

        let payloads = match self.api.fetch_course_notifications(course_id).await {
            Ok(payloads) => payloads,
            Err(err) => {
                warn!("Course {course_id} refresh failed, trying the live channel: {err}");
                match self.channel.fetch_history(course_id).await {
                    Some(payloads) => payloads,
                    None => return Err(err),
                }
            }
        };

        let fresh = self.read_status.overlay(payloads).await;
        let mut guard = self.notifications.write().await;
        guard.retain(|n| n.course_id != course_id);
        guard.extend(fresh);
        guard.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(())
    }

    /// Fast unread count via the dedicated server query, debounced to the
    /// configured minimum interval and falling back to the derived count.
    pub async fn fetch_unread_count(&self) -> u64 {
        {
            let mut fast = self.fast_count.lock().await;
            if let (Some(at), Some(value)) = (fast.last_at, fast.last_value) {
                if at.elapsed() < self.unread_debounce {
                    return value;
                }
            }
            match self.api.fetch_unread_count().await {
                Ok(value) => {
                    fast.last_at = Some(Instant::now());
                    fast.last_value = Some(value);
                    return value;
                }
                Err(err) => {
                    warn!("Unread-count query failed, using derived count: {err}");
                }
            }
        }
        self.unread_count().await as u64
    }

    /// Optimistic mark-as-read: memory and cache first, then the channel
    /// with the REST fallback. A network failure rolls both back and is
    /// re-thrown so the UI can react.
    pub async fn mark_read(&self, notification_id: &str) -> Result<(), AppError> {
        let prior_memory = {
            let guard = self.notifications.read().await;
            guard
                .iter()
                .find(|n| n.id == notification_id)
                .map(|n| n.is_read)
        };
        let prior_cache = self.read_status.get(notification_id).await;

        self.set_memory_read(notification_id, true).await;
        if let Err(err) = self.read_status.set(notification_id, true).await {
            warn!("Read-status cache write failed: {err}");
        }

        if self.channel.mark_read(notification_id).await {
            return Ok(());
        }
        if let Err(err) = self.api.mark_read(notification_id).await {
            if let Some(prior) = prior_memory {
                self.set_memory_read(notification_id, prior).await;
            }
            let restore = prior_cache.or(prior_memory).unwrap_or(false);
            if let Err(cache_err) = self.read_status.set(notification_id, restore).await {
                warn!("Read-status rollback failed: {cache_err}");
            }
            return Err(err);
        }
        Ok(())
    }

    /// Course-wide optimistic mark-as-read with the same rollback contract.
    pub async fn mark_all_read(&self, course_id: &str) -> Result<(), AppError> {
        let prior: Vec<(String, bool)> = {
            let guard = self.notifications.read().await;
            guard
                .iter()
                .filter(|n| n.course_id == course_id)
                .map(|n| (n.id.clone(), n.is_read))
                .collect()
        };
        let ids: Vec<String> = prior.iter().map(|(id, _)| id.clone()).collect();

        {
            let mut guard = self.notifications.write().await;
            for notification in guard.iter_mut().filter(|n| n.course_id == course_id) {
                notification.is_read = true;
            }
        }
        if let Err(err) = self.read_status.set_many(&ids, true).await {
            warn!("Read-status cache write failed: {err}");
        }

        if self.channel.mark_all_read(course_id).await {
            return Ok(());
        }
        if let Err(err) = self.api.mark_all_read(course_id).await {
            {
                let mut guard = self.notifications.write().await;
                for notification in guard.iter_mut() {
                    if let Some((_, was_read)) =
                        prior.iter().find(|(id, _)| *id == notification.id)
                    {
                        notification.is_read = *was_read;
                    }
                }
            }
            for (id, was_read) in &prior {
                if let Err(cache_err) = self.read_status.set(id, *was_read).await {
                    warn!("Read-status rollback failed for {id}: {cache_err}");
                }
            }
            return Err(err);
        }
        Ok(())
    }

    /// Starts draining the manager's push stream into the in-memory list.
    pub fn start_push_intake(&self) {
        if self.intake_running.swap(true, Ordering::SeqCst) {
            return;
        }
        let service = self.clone();
        let mut pushes = self.channel.subscribe_pushes();
        tokio::spawn(async move {
            loop {
                match pushes.recv().await {
                    Ok(payload) => service.handle_incoming(payload).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Push intake lagged; dropped {skipped} notifications");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            service.intake_running.store(false, Ordering::SeqCst);
        });
    }

    /// Live pushes are prepended as they arrive. A push racing a fetch can
    /// duplicate an id; the UI keys by id, so no de-dup happens here.
    pub async fn handle_incoming(&self, payload: NotificationPayload) {
        let cached = self.read_status.get(&payload.id).await;
        let notification = Notification::from_payload(payload, cached);
        debug!("Live notification {} received", notification.id);
        let mut guard = self.notifications.write().await;
        guard.insert(0, notification);
    }

    /// Drops per-user in-memory state at logout.
    pub async fn clear(&self) {
        self.notifications.write().await.clear();
        let mut fast = self.fast_count.lock().await;
        *fast = FastCount::default();
    }

    async fn set_memory_read(&self, notification_id: &str, is_read: bool) {
        let mut guard = self.notifications.write().await;
        if let Some(notification) = guard.iter_mut().find(|n| n.id == notification_id) {
            notification.is_read = is_read;
        }
    }
}
