use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub websocket_url: String,
    pub http_timeout: Duration,
    pub outbox_capacity: usize,
    pub max_retry_attempts: u32,
    pub retry_delay: Duration,
    pub max_retry_delay: Duration,
    pub log_level: String,
    pub keyring_fallback: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:3000".to_string(),
            websocket_url: "ws://127.0.0.1:3000/ws".to_string(),
            http_timeout: Duration::from_secs(15),
            outbox_capacity: 64,
            max_retry_attempts: 5,
            retry_delay: Duration::from_secs(2),
            max_retry_delay: Duration::from_secs(30),
            log_level: "info".to_string(),
            keyring_fallback: false,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Self {
            api_base_url: env::var("API_BASE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base_url),
            websocket_url: env::var("WEBSOCKET_URL").unwrap_or(defaults.websocket_url),
            http_timeout: env::var("HTTP_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.http_timeout),
            outbox_capacity: env::var("OUTBOX_CAPACITY").ok().and_then(|v| v.parse().ok())
                .unwrap_or(defaults.outbox_capacity),
            max_retry_attempts: env::var("WS_MAX_RETRY_ATTEMPTS").ok().and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_retry_attempts),
            retry_delay: env::var("WS_RETRY_DELAY_SECS").ok().and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.retry_delay),
            max_retry_delay: env::var("WS_MAX_RETRY_DELAY_SECS").ok().and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.max_retry_delay),
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            keyring_fallback: env::var("KEYRING_FALLBACK").map(|v| v == "true" || v == "1").unwrap_or(false),
        }
    }
}
