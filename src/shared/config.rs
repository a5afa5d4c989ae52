use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub channel: ChannelConfig,
    pub notifications: NotificationsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    /// Abort-after budget for health-check style probes, not for normal calls.
    pub probe_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub url: String,
    pub base_reconnect_delay_ms: u64,
    pub max_reconnect_delay_ms: u64,
    pub max_reconnect_attempts: u32,
    /// Minimum spacing between any two connection attempts.
    pub min_attempt_spacing_ms: u64,
    pub rate_limit_base_delay_ms: u64,
    pub health_interval_ms: u64,
    pub invoke_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    /// Minimum interval between fast unread-count queries.
    pub unread_debounce_ms: u64,
    /// How long a fetched course roster suppresses another auto-subscribe fetch.
    pub roster_ttl_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite:data/coursehub.db".to_string(),
                max_connections: 5,
            },
            api: ApiConfig {
                base_url: "https://api.coursehub.local".to_string(),
                probe_timeout_ms: 3_000,
            },
            channel: ChannelConfig {
                url: "wss://api.coursehub.local/hubs/notifications".to_string(),
                base_reconnect_delay_ms: 1_000,
                max_reconnect_delay_ms: 30_000,
                max_reconnect_attempts: 8,
                min_attempt_spacing_ms: 2_000,
                rate_limit_base_delay_ms: 30_000,
                health_interval_ms: 30_000,
                invoke_timeout_ms: 5_000,
            },
            notifications: NotificationsConfig {
                unread_debounce_ms: 5_000,
                roster_ttl_secs: 120,
            },
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("COURSEHUB_DATABASE_URL") {
            if !v.trim().is_empty() {
                cfg.database.url = v.trim().to_string();
            }
        }
        if let Ok(v) = std::env::var("COURSEHUB_API_BASE_URL") {
            if !v.trim().is_empty() {
                cfg.api.base_url = v.trim().to_string();
            }
        }
        if let Ok(v) = std::env::var("COURSEHUB_CHANNEL_URL") {
            if !v.trim().is_empty() {
                cfg.channel.url = v.trim().to_string();
            }
        }
        if let Ok(v) = std::env::var("COURSEHUB_RECONNECT_BASE_MS") {
            if let Some(value) = parse_u64(&v) {
                cfg.channel.base_reconnect_delay_ms = value.max(1);
            }
        }
        if let Ok(v) = std::env::var("COURSEHUB_RECONNECT_MAX_ATTEMPTS") {
            if let Some(value) = parse_u64(&v) {
                cfg.channel.max_reconnect_attempts = value as u32;
            }
        }
        if let Ok(v) = std::env::var("COURSEHUB_UNREAD_DEBOUNCE_MS") {
            if let Some(value) = parse_u64(&v) {
                cfg.notifications.unread_debounce_ms = value;
            }
        }
        if let Ok(v) = std::env::var("COURSEHUB_ROSTER_TTL_SECS") {
            if let Some(value) = parse_u64(&v) {
                cfg.notifications.roster_ttl_secs = value.max(1);
            }
        }

        cfg
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }
        if self.channel.base_reconnect_delay_ms == 0 {
            return Err("Channel base_reconnect_delay_ms must be greater than 0".to_string());
        }
        if self.channel.max_reconnect_delay_ms < self.channel.base_reconnect_delay_ms {
            return Err(
                "Channel max_reconnect_delay_ms must not be below the base delay".to_string(),
            );
        }
        if self.channel.rate_limit_base_delay_ms == 0 {
            return Err("Channel rate_limit_base_delay_ms must be greater than 0".to_string());
        }
        Ok(())
    }
}

fn parse_u64(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}
