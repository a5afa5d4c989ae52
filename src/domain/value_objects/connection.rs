use serde::{Deserialize, Serialize};

/// Channel lifecycle: `Disconnected → Connecting → Connected`,
/// `Connected → Reconnecting → Connected|Disconnected`, any state
/// `→ RateLimited` on a rate-limit signal. Leaving `RateLimited` only
/// happens through a scheduled recovery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    RateLimited,
}

/// Transient, process-lifetime view of the channel for the UI. `connected`
/// and `rate_limited` are never both true; both can be false mid-transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSnapshot {
    pub phase: ConnectionPhase,
    pub rate_limited: bool,
    pub reconnect_attempts: u32,
}

impl ConnectionSnapshot {
    pub fn is_connected(&self) -> bool {
        self.phase == ConnectionPhase::Connected
    }
}
