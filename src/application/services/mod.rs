pub mod connection_manager;
pub mod notification_service;
pub mod read_status;
pub mod subscription_service;

pub use connection_manager::{ConnectionManager, LiveChannelService};
pub use notification_service::NotificationService;
pub use read_status::ReadStatusService;
pub use subscription_service::SubscriptionService;
