use crate::application::ports::{
    AuthContext, NotificationApi, NotificationTransport, ReadStatusRepository,
    SubscriptionRepository,
};
use crate::application::services::{
    ConnectionManager, LiveChannelService, NotificationService, ReadStatusService,
    SubscriptionService,
};
use crate::domain::value_objects::UserSession;
use crate::infrastructure::api::HttpNotificationGateway;
use crate::infrastructure::auth::SessionHandle;
use crate::infrastructure::channel::WsTransport;
use crate::infrastructure::database::{
    ConnectionPool, SqliteReadStatusRepository, SqliteSubscriptionRepository,
};
use crate::shared::config::AppConfig;
use crate::shared::error::AppError;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Composition root. Wires the SQLite stores, the REST gateway, the
/// WebSocket transport and the services together; everything downstream
/// receives its collaborators through the port traits.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub session: Arc<SessionHandle>,
    pub channel: Arc<dyn LiveChannelService>,
    pub subscriptions: Arc<SubscriptionService>,
    pub read_status: Arc<ReadStatusService>,
    pub notifications: Arc<NotificationService>,
    pool: Option<ConnectionPool>,
}

impl AppState {
    pub async fn new(config: AppConfig) -> Result<Self, AppError> {
        config.validate().map_err(AppError::Configuration)?;

        let pool =
            ConnectionPool::connect(&config.database.url, config.database.max_connections).await?;

        let subscription_repo: Arc<dyn SubscriptionRepository> =
            Arc::new(SqliteSubscriptionRepository::new(pool.clone()));
        let read_status_repo: Arc<dyn ReadStatusRepository> =
            Arc::new(SqliteReadStatusRepository::new(pool.clone()));
        let api: Arc<dyn NotificationApi> = Arc::new(HttpNotificationGateway::new(&config.api)?);
        let transport: Arc<dyn NotificationTransport> = Arc::new(WsTransport::new(&config.channel));

        let mut state = Self::with_components(
            config,
            transport,
            api,
            subscription_repo,
            read_status_repo,
        );
        state.pool = Some(pool);
        Ok(state)
    }

    /// DI constructor; tests plug in memory repositories and scripted
    /// transports here.
    pub fn with_components(
        config: AppConfig,
        transport: Arc<dyn NotificationTransport>,
        api: Arc<dyn NotificationApi>,
        subscription_repo: Arc<dyn SubscriptionRepository>,
        read_status_repo: Arc<dyn ReadStatusRepository>,
    ) -> Self {
        let session = Arc::new(SessionHandle::new());
        let auth: Arc<dyn AuthContext> = session.clone();

        let channel: Arc<dyn LiveChannelService> = Arc::new(ConnectionManager::new(
            transport,
            api.clone(),
            auth.clone(),
            config.channel.clone(),
            Duration::from_millis(config.api.probe_timeout_ms),
        ));

        let subscriptions = Arc::new(SubscriptionService::new(
            subscription_repo,
            api.clone(),
            auth.clone(),
            channel.clone(),
            Duration::from_secs(config.notifications.roster_ttl_secs),
        ));
        subscriptions.start_rejoin_on_reconnect();
        let read_status = Arc::new(ReadStatusService::new(read_status_repo, auth.clone()));
        let notifications = Arc::new(NotificationService::new(
            api,
            auth,
            channel.clone(),
            subscriptions.clone(),
            read_status.clone(),
            Duration::from_millis(config.notifications.unread_debounce_ms),
        ));
        notifications.start_push_intake();

        Self {
            config,
            session,
            channel,
            subscriptions,
            read_status,
            notifications,
            pool: None,
        }
    }

    /// Brings the notification core up for a freshly authenticated user:
    /// session in place, channel maintained, auto-subscribe and group
    /// rejoin best-effort.
    pub async fn login(&self, session: UserSession) -> Result<(), AppError> {
        info!("Starting notification core for user {}", session.user_id);
        self.session.set(session);

        self.channel.start_maintaining().await;
        let connected = self.channel.connect().await;
        if !connected {
            warn!("Initial channel connect failed; reconnect loop will retry");
        }

        if let Err(err) = self.subscriptions.auto_subscribe().await {
            warn!("Auto-subscribe failed at login: {err}");
        }
        if connected {
            self.subscriptions.rejoin_groups().await;
        }

        self.notifications.load_immediate().await
    }

    /// Tears the per-user state down. Durable stores keep their rows; only
    /// the session, the socket and in-memory caches go.
    pub async fn logout(&self) {
        self.channel.stop_maintaining().await;
        self.channel.force_disconnect().await;
        self.notifications.clear().await;
        self.session.clear();
        info!("Notification core stopped");
    }

    pub async fn shutdown(&self) {
        self.logout().await;
        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }
}
