use thiserror::Error;

/// Errors returned by request/response calls against the backend.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("not authorized (HTTP {0})")]
    Unauthorized(u16),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unexpected HTTP status {status} for {path}")]
    Status { status: u16, path: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("message send failed: {0}")]
    MessageSendFailed(String),

    #[error("outbox full ({0} pending), event dropped")]
    OutboxFull(usize),

    #[error("transport disconnected")]
    Disconnected,

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("operation timed out")]
    Timeout,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no active session")]
    Missing,

    #[error("keyring unavailable and file fallback disabled")]
    KeyringUnavailable,

    #[error("session storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored session is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}
