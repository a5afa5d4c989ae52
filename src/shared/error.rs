use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Channel error: {0}")]
    Channel(String),
    #[error("Rate limited: {0}")]
    RateLimited(String),
    #[error("Auth error: {0}")]
    Auth(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Timeout: {0}")]
    Timeout(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Typed rate-limit contract, with a signature fallback for transports
    /// that only surface free-form close reasons.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            AppError::RateLimited(_) => true,
            AppError::Network(msg) | AppError::Channel(msg) => is_rate_limit_signal(msg),
            _ => false,
        }
    }
}

/// Legacy string signatures the backend uses when it sheds load.
pub fn is_rate_limit_signal(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("429")
        || lower.contains("rate limit")
        || lower.contains("throttle")
        || lower.contains("too many requests")
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err
            .status()
            .map(|status| status.as_u16() == 429)
            .unwrap_or(false)
        {
            return AppError::RateLimited(err.to_string());
        }
        if err.is_timeout() {
            return AppError::Timeout(err.to_string());
        }
        AppError::Network(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for AppError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        let message = err.to_string();
        if is_rate_limit_signal(&message) {
            return AppError::RateLimited(message);
        }
        AppError::Channel(message)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<String> for AppError {
    fn from(err: String) -> Self {
        AppError::Internal(err)
    }
}

impl From<&str> for AppError {
    fn from(err: &str) -> Self {
        AppError::Internal(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_signal_matches_known_signatures() {
        assert!(is_rate_limit_signal("HTTP 429 returned"));
        assert!(is_rate_limit_signal("connection throttled by server"));
        assert!(is_rate_limit_signal("Rate limit exceeded"));
        assert!(is_rate_limit_signal("too many requests"));
        assert!(!is_rate_limit_signal("connection reset by peer"));
    }

    #[test]
    fn typed_variant_wins_over_signature_matching() {
        assert!(AppError::RateLimited("slow down".into()).is_rate_limited());
        assert!(AppError::Channel("closed: 429".into()).is_rate_limited());
        assert!(!AppError::Network("dns failure".into()).is_rate_limited());
        assert!(!AppError::Database("429 rows".into()).is_rate_limited());
    }
}
