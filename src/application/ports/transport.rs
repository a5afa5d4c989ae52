use crate::domain::entities::NotificationPayload;
use crate::domain::value_objects::UserSession;
use crate::shared::error::AppError;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

/// Events surfaced by the underlying transport. The transport does not
/// filter pushes by target; the connection manager does that client-side.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Notification(NotificationPayload),
    Closed { reason: Option<String> },
}

/// The persistent push-capable channel. Socket negotiation, keepalive and
/// frame encoding live behind this seam; the manager only sees connect,
/// invoke, and the event stream.
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    async fn connect(&self, session: &UserSession) -> Result<(), AppError>;

    async fn disconnect(&self);

    /// Server-invoked method call (join/leave group, mark read, history).
    async fn invoke(&self, method: &str, args: Value) -> Result<Value, AppError>;

    fn events(&self) -> broadcast::Receiver<TransportEvent>;
}
