pub mod auth_context;
pub mod notification_api;
pub mod repositories;
pub mod transport;

pub use auth_context::AuthContext;
pub use notification_api::NotificationApi;
pub use repositories::{ReadStatusRepository, SubscriptionRepository};
pub use transport::{NotificationTransport, TransportEvent};
