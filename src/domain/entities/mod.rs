pub mod notification;
pub mod subscription;

pub use notification::{Notification, NotificationKind, NotificationPayload};
pub use subscription::{CourseRef, CourseSubscription};
