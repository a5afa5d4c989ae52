pub mod connection;
pub mod session;

pub use connection::{ConnectionPhase, ConnectionSnapshot};
pub use session::{UserRole, UserSession};
