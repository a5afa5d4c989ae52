pub mod connection_pool;
pub mod read_status_repository;
pub mod subscription_repository;

pub use connection_pool::ConnectionPool;
pub use read_status_repository::SqliteReadStatusRepository;
pub use subscription_repository::SqliteSubscriptionRepository;
