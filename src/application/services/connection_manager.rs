use crate::application::ports::{
    AuthContext, NotificationApi, NotificationTransport, TransportEvent,
};
use crate::domain::entities::NotificationPayload;
use crate::domain::value_objects::{ConnectionPhase, ConnectionSnapshot, UserSession};
use crate::shared::config::ChannelConfig;
use crate::shared::error::is_rate_limit_signal;
use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Progressive recovery stages after a rate-limit signal, as multiples of the
/// configured base delay. Once exhausted, recovery repeats at the final
/// multiplier.
const RATE_LIMIT_STAGES: [f64; 4] = [1.0, 1.5, 2.0, 3.0];
const RATE_LIMIT_REPEAT_MULTIPLIER: f64 = 5.0;

const PUSH_BUFFER: usize = 256;

/// Channel-facing surface the rest of the core depends on. Everything
/// returns a plain success indicator: a channel op that cannot run because
/// the channel is not ready is a no-op `false`, and callers fall back to the
/// request/response path.
#[async_trait]
pub trait LiveChannelService: Send + Sync {
    /// Idempotent. Concurrent callers share a single underlying attempt and
    /// resolve with its outcome.
    async fn connect(&self) -> bool;

    async fn disconnect(&self);

    /// Teardown that also clears the maintain intent (logout path).
    async fn force_disconnect(&self);

    async fn start_maintaining(&self);

    async fn stop_maintaining(&self);

    /// Browser "online" event; resets the reconnect budget.
    async fn notify_online(&self);

    /// Tab became visible again; resets the reconnect budget.
    async fn notify_visible(&self);

    async fn is_ready(&self) -> bool;

    async fn snapshot(&self) -> ConnectionSnapshot;

    async fn join_group(&self, course_id: &str) -> bool;

    async fn leave_group(&self, course_id: &str) -> bool;

    async fn mark_read(&self, notification_id: &str) -> bool;

    async fn mark_all_read(&self, course_id: &str) -> bool;

    async fn fetch_history(&self, course_id: &str) -> Option<Vec<NotificationPayload>>;

    /// Target-filtered pushes. Multiple subscribers are supported; a dropped
    /// receiver never blocks delivery to the others.
    fn subscribe_pushes(&self) -> broadcast::Receiver<NotificationPayload>;

    /// Fires after every successful connect, automatic reconnects included.
    /// Server-side group membership dies with the socket, so listeners use
    /// this to re-establish it.
    fn subscribe_connected(&self) -> broadcast::Receiver<()>;
}

#[derive(Debug)]
struct ManagerState {
    phase: ConnectionPhase,
    rate_limited: bool,
    reconnect_attempts: u32,
    maintain: bool,
}

impl ManagerState {
    fn new() -> Self {
        Self {
            phase: ConnectionPhase::Disconnected,
            rate_limited: false,
            reconnect_attempts: 0,
            maintain: false,
        }
    }

    fn ready(&self) -> bool {
        self.phase == ConnectionPhase::Connected && !self.rate_limited
    }
}

/// Owns the single live channel to the backend: connect/disconnect,
/// exponential-backoff reconnection, rate-limit recovery, and the push
/// fan-out. Constructed once at the application root and shared by clone.
#[derive(Clone)]
pub struct ConnectionManager {
    transport: Arc<dyn NotificationTransport>,
    api: Arc<dyn NotificationApi>,
    auth: Arc<dyn AuthContext>,
    config: ChannelConfig,
    probe_timeout: Duration,
    state: Arc<RwLock<ManagerState>>,
    in_flight: Arc<Mutex<Option<watch::Receiver<Option<bool>>>>>,
    last_attempt: Arc<Mutex<Option<Instant>>>,
    recovery_running: Arc<AtomicBool>,
    health_running: Arc<AtomicBool>,
    pump_running: Arc<AtomicBool>,
    pushes_tx: broadcast::Sender<NotificationPayload>,
    connected_tx: broadcast::Sender<()>,
}

impl ConnectionManager {
    pub fn new(
        transport: Arc<dyn NotificationTransport>,
        api: Arc<dyn NotificationApi>,
        auth: Arc<dyn AuthContext>,
        config: ChannelConfig,
        probe_timeout: Duration,
    ) -> Self {
        let (pushes_tx, _) = broadcast::channel(PUSH_BUFFER);
        let (connected_tx, _) = broadcast::channel(8);
        Self {
            transport,
            api,
            auth,
            config,
            probe_timeout,
            state: Arc::new(RwLock::new(ManagerState::new())),
            in_flight: Arc::new(Mutex::new(None)),
            last_attempt: Arc::new(Mutex::new(None)),
            recovery_running: Arc::new(AtomicBool::new(false)),
            health_running: Arc::new(AtomicBool::new(false)),
            pump_running: Arc::new(AtomicBool::new(false)),
            pushes_tx,
            connected_tx,
        }
    }

    async fn attempt_connect(&self) -> bool {
        let Some(session) = self.auth.current_session() else {
            debug!("No active session; live channel unavailable");
            return false;
        };

        self.enforce_attempt_spacing().await;

        {
            let mut state = self.state.write().await;
            if state.phase == ConnectionPhase::Connected {
                return true;
            }
            state.phase = if state.reconnect_attempts > 0 {
                ConnectionPhase::Reconnecting
            } else {
                ConnectionPhase::Connecting
            };
        }

        match self.transport.connect(&session).await {
            Ok(()) => {
                {
                    let mut state = self.state.write().await;
                    state.phase = ConnectionPhase::Connected;
                    state.rate_limited = false;
                    state.reconnect_attempts = 0;
                }
                info!("Live channel connected");
                let _ = self.connected_tx.send(());
                true
            }
            Err(err) if err.is_rate_limited() => {
                warn!("Connection attempt rate limited: {err}");
                self.mark_rate_limited().await;
                false
            }
            Err(err) => {
                warn!("Connection attempt failed: {err}");
                let mut state = self.state.write().await;
                if !state.rate_limited {
                    state.phase = ConnectionPhase::Disconnected;
                }
                false
            }
        }
    }

    async fn enforce_attempt_spacing(&self) {
        let wait = {
            let mut last = self.last_attempt.lock().await;
            let now = Instant::now();
            let spacing = Duration::from_millis(self.config.min_attempt_spacing_ms);
            let wait = match *last {
                Some(previous) => spacing
                    .checked_sub(now.duration_since(previous))
                    .unwrap_or(Duration::ZERO),
                None => Duration::ZERO,
            };
            *last = Some(now + wait);
            wait
        };
        if !wait.is_zero() {
            debug!("Spacing connection attempts by {wait:?}");
            tokio::time::sleep(wait).await;
        }
    }

    async fn mark_rate_limited(&self) {
        {
            let mut state = self.state.write().await;
            state.rate_limited = true;
            state.phase = ConnectionPhase::RateLimited;
        }
        if !self.recovery_running.swap(true, Ordering::SeqCst) {
            let manager = self.clone();
            tokio::spawn(async move { manager.rate_limit_recovery_loop().await });
        }
    }

    /// Staged recovery out of the rate-limited state. Each stage
    /// speculatively clears the flag, tries a normal connect, and restores
    /// the flag on failure.
    async fn rate_limit_recovery_loop(&self) {
        let base = Duration::from_millis(self.config.rate_limit_base_delay_ms);
        let mut stage = 0usize;
        loop {
            let multiplier = RATE_LIMIT_STAGES
                .get(stage)
                .copied()
                .unwrap_or(RATE_LIMIT_REPEAT_MULTIPLIER);
            let delay = base.mul_f64(multiplier);
            debug!("Rate-limit recovery stage {stage}; next attempt in {delay:?}");
            tokio::time::sleep(delay).await;

            if !self.state.read().await.rate_limited {
                break;
            }

            {
                let mut state = self.state.write().await;
                state.rate_limited = false;
                state.phase = ConnectionPhase::Disconnected;
            }

            if self.connect().await {
                info!("Recovered from rate limiting");
                break;
            }

            let mut state = self.state.write().await;
            if state.phase != ConnectionPhase::Connected {
                state.rate_limited = true;
                state.phase = ConnectionPhase::RateLimited;
            }
            drop(state);
            stage += 1;
        }
        self.recovery_running.store(false, Ordering::SeqCst);
    }

    /// Backoff retry task. Each iteration claims the next attempt under the
    /// cap, sleeps, and tries a normal connect; rate limiting, an explicit
    /// reconnect, or the cap all end the task.
    fn schedule_reconnect(&self) {
        let manager = self.clone();
        tokio::spawn(async move {
            loop {
                let attempt = {
                    let mut state = manager.state.write().await;
                    if state.rate_limited || state.phase == ConnectionPhase::Connected {
                        return;
                    }
                    if state.reconnect_attempts >= manager.config.max_reconnect_attempts {
                        debug!("Reconnect attempt cap reached; waiting for an explicit trigger");
                        state.phase = ConnectionPhase::Disconnected;
                        return;
                    }
                    state.reconnect_attempts += 1;
                    state.phase = ConnectionPhase::Reconnecting;
                    state.reconnect_attempts
                };

                let delay = manager.reconnect_delay(attempt);
                debug!("Reconnect attempt {attempt} in {delay:?}");
                tokio::time::sleep(delay).await;

                {
                    let state = manager.state.read().await;
                    if state.rate_limited || state.phase == ConnectionPhase::Connected {
                        return;
                    }
                }
                if manager.connect().await {
                    return;
                }
            }
        });
    }

    fn reconnect_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        let millis = self
            .config
            .base_reconnect_delay_ms
            .saturating_mul(factor)
            .min(self.config.max_reconnect_delay_ms);
        Duration::from_millis(millis)
    }

    fn spawn_event_pump(&self) {
        if self.pump_running.swap(true, Ordering::SeqCst) {
            return;
        }
        let manager = self.clone();
        let mut events = self.transport.events();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(TransportEvent::Notification(payload)) => manager.handle_push(payload).await,
                    Ok(TransportEvent::Closed { reason }) => {
                        manager.on_channel_closed(reason).await
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Transport event stream lagged; dropped {skipped} events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            manager.pump_running.store(false, Ordering::SeqCst);
        });
    }

    /// Client-side target filtering: the channel is not assumed to scope
    /// delivery perfectly, so anything not addressed to the current user is
    /// silently dropped.
    async fn handle_push(&self, payload: NotificationPayload) {
        let Some(session) = self.auth.current_session() else {
            debug!("Dropping push without an active session");
            return;
        };
        if !targets_session(&payload, &session) {
            debug!("Dropping push {} not targeted at current user", payload.id);
            return;
        }
        let _ = self.pushes_tx.send(payload);
    }

    async fn on_channel_closed(&self, reason: Option<String>) {
        if let Some(reason) = reason.as_deref() {
            if is_rate_limit_signal(reason) {
                warn!("Channel closed by rate limiting: {reason}");
                self.mark_rate_limited().await;
                return;
            }
        }

        let unexpected = {
            let mut state = self.state.write().await;
            if state.phase == ConnectionPhase::Connected {
                state.phase = ConnectionPhase::Reconnecting;
                true
            } else {
                false
            }
        };
        if unexpected {
            warn!(
                "Live channel closed unexpectedly: {}",
                reason.as_deref().unwrap_or("no reason given")
            );
            self.schedule_reconnect();
        }
    }

    async fn health_loop(&self) {
        let mut ticker =
            tokio::time::interval(Duration::from_millis(self.config.health_interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let (maintain, ready, rate_limited) = {
                let state = self.state.read().await;
                (state.maintain, state.ready(), state.rate_limited)
            };
            if !maintain {
                break;
            }
            if ready || rate_limited {
                continue;
            }
            match tokio::time::timeout(self.probe_timeout, self.api.health_check()).await {
                Ok(Ok(())) => {
                    self.connect().await;
                }
                Ok(Err(err)) => debug!("Health probe failed: {err}"),
                Err(_) => debug!("Health probe timed out"),
            }
        }
        self.health_running.store(false, Ordering::SeqCst);
    }

    async fn wake(&self, trigger: &str) {
        let maintain = {
            let mut state = self.state.write().await;
            state.reconnect_attempts = 0;
            state.maintain
        };
        if !maintain {
            return;
        }
        {
            let state = self.state.read().await;
            if state.ready() || state.rate_limited {
                return;
            }
        }
        debug!("{trigger} event; reattempting connection");
        self.connect().await;
    }

    async fn invoke_checked(&self, method: &str, args: serde_json::Value) -> Option<serde_json::Value> {
        {
            let state = self.state.read().await;
            if !state.ready() {
                debug!("Channel not ready; skipping {method}");
                return None;
            }
        }
        match self.transport.invoke(method, args).await {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("Channel invoke {method} failed: {err}");
                if err.is_rate_limited() {
                    self.mark_rate_limited().await;
                }
                None
            }
        }
    }
}

fn targets_session(payload: &NotificationPayload, session: &UserSession) -> bool {
    if let Some(user_id) = &payload.target_user_id {
        return user_id == &session.user_id;
    }
    if let Some(role) = &payload.target_role {
        return *role == session.role;
    }
    // Untargeted course broadcasts pass through.
    true
}

#[async_trait]
impl LiveChannelService for ConnectionManager {
    async fn connect(&self) -> bool {
        if self.auth.current_session().is_none() {
            return false;
        }
        {
            let state = self.state.read().await;
            if state.phase == ConnectionPhase::Connected {
                return true;
            }
            if state.rate_limited {
                return false;
            }
        }

        enum Role {
            Leader(watch::Sender<Option<bool>>),
            Follower(watch::Receiver<Option<bool>>),
        }

        let role = {
            let mut slot = self.in_flight.lock().await;
            match slot.as_ref() {
                Some(receiver) => Role::Follower(receiver.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    *slot = Some(rx);
                    Role::Leader(tx)
                }
            }
        };

        match role {
            Role::Follower(mut receiver) => loop {
                let resolved = *receiver.borrow();
                if let Some(outcome) = resolved {
                    return outcome;
                }
                if receiver.changed().await.is_err() {
                    return self.is_ready().await;
                }
            },
            Role::Leader(tx) => {
                let outcome = self.attempt_connect().await;
                {
                    let mut slot = self.in_flight.lock().await;
                    *slot = None;
                }
                let _ = tx.send(Some(outcome));
                if outcome {
                    self.spawn_event_pump();
                }
                outcome
            }
        }
    }

    async fn disconnect(&self) {
        {
            let mut state = self.state.write().await;
            state.phase = ConnectionPhase::Disconnected;
            state.reconnect_attempts = 0;
        }
        self.transport.disconnect().await;
        info!("Live channel disconnected");
    }

    async fn force_disconnect(&self) {
        {
            let mut state = self.state.write().await;
            state.maintain = false;
            state.rate_limited = false;
        }
        self.disconnect().await;
    }

    async fn start_maintaining(&self) {
        {
            let mut state = self.state.write().await;
            state.maintain = true;
        }
        if !self.health_running.swap(true, Ordering::SeqCst) {
            let manager = self.clone();
            tokio::spawn(async move { manager.health_loop().await });
        }
    }

    async fn stop_maintaining(&self) {
        let mut state = self.state.write().await;
        state.maintain = false;
    }

    async fn notify_online(&self) {
        self.wake("online").await;
    }

    async fn notify_visible(&self) {
        self.wake("visibility").await;
    }

    async fn is_ready(&self) -> bool {
        self.state.read().await.ready()
    }

    async fn snapshot(&self) -> ConnectionSnapshot {
        let state = self.state.read().await;
        ConnectionSnapshot {
            phase: state.phase,
            rate_limited: state.rate_limited,
            reconnect_attempts: state.reconnect_attempts,
        }
    }

    async fn join_group(&self, course_id: &str) -> bool {
        self.invoke_checked("JoinCourseGroup", json!({ "courseId": course_id }))
            .await
            .is_some()
    }

    async fn leave_group(&self, course_id: &str) -> bool {
        self.invoke_checked("LeaveCourseGroup", json!({ "courseId": course_id }))
            .await
            .is_some()
    }

    async fn mark_read(&self, notification_id: &str) -> bool {
        self.invoke_checked(
            "MarkNotificationRead",
            json!({ "notificationId": notification_id }),
        )
        .await
        .is_some()
    }

    async fn mark_all_read(&self, course_id: &str) -> bool {
        self.invoke_checked(
            "MarkCourseNotificationsRead",
            json!({ "courseId": course_id }),
        )
        .await
        .is_some()
    }

    async fn fetch_history(&self, course_id: &str) -> Option<Vec<NotificationPayload>> {
        let value = self
            .invoke_checked("GetCourseNotifications", json!({ "courseId": course_id }))
            .await?;
        match serde_json::from_value(value) {
            Ok(payloads) => Some(payloads),
            Err(err) => {
                warn!("Malformed history payload for course {course_id}: {err}");
                None
            }
        }
    }

    fn subscribe_pushes(&self) -> broadcast::Receiver<NotificationPayload> {
        self.pushes_tx.subscribe()
    }

    fn subscribe_connected(&self) -> broadcast::Receiver<()> {
        self.connected_tx.subscribe()
    }
}
