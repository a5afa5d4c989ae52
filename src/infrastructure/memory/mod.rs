mod repositories;

pub use repositories::{MemoryReadStatusRepository, MemorySubscriptionRepository};
