//! Request/response calls against the service backend.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use url::Url;

use crate::client::models::chat_message::ChatMessage;
use crate::client::services::message_parser;
use crate::common::config::ClientConfig;
use crate::common::error::ApiError;

/// Answer of `GET /api/service/openTickets`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenTicket {
    pub has_open: bool,
    #[serde(default)]
    pub ticket_id: Option<String>,
}

impl OpenTicket {
    /// Ticket the floating chat entry point should open, if any.
    pub fn entry_point(&self) -> Option<&str> {
        if self.has_open {
            self.ticket_id.as_deref()
        } else {
            None
        }
    }
}

/// Backend calls the chat core depends on. Implemented over HTTP by
/// [`ApiClient`]; tests substitute in-memory fakes.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn chat_history(&self, ticket_id: &str, token: &str) -> Result<Vec<ChatMessage>, ApiError>;

    async fn open_ticket(&self, token: &str) -> Result<OpenTicket, ApiError>;
}

pub struct ApiClient {
    inner: reqwest::Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: std::time::Duration) -> Result<Self, ApiError> {
        let inner = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            inner,
            base_url: Url::parse(base_url)?,
        })
    }

    pub fn from_config(cfg: &ClientConfig) -> Result<Self, ApiError> {
        Self::new(&cfg.api_base_url, cfg.http_timeout)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_text(&self, url: Url, token: &str) -> Result<String, ApiError> {
        log::debug!("[API] GET {}", url);
        let response = self
            .inner
            .get(url.clone())
            .header(reqwest::header::AUTHORIZATION, format!("Bearer {}", token))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            log::warn!("[API] GET {} -> {}", url.path(), status);
            return Err(status_error(status, url.path()));
        }
        Ok(response.text().await?)
    }
}

fn status_error(status: StatusCode, path: &str) -> ApiError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Unauthorized(status.as_u16()),
        StatusCode::NOT_FOUND => ApiError::NotFound(path.to_string()),
        _ => ApiError::Status {
            status: status.as_u16(),
            path: path.to_string(),
        },
    }
}

#[async_trait]
impl ChatApi for ApiClient {
    async fn chat_history(&self, ticket_id: &str, token: &str) -> Result<Vec<ChatMessage>, ApiError> {
        let url = self.endpoint(&["api", "service", "chat", ticket_id])?;
        let body = self.get_text(url, token).await?;
        message_parser::parse_history(&body, ticket_id)
    }

    async fn open_ticket(&self, token: &str) -> Result<OpenTicket, ApiError> {
        let url = self.endpoint(&["api", "service", "openTickets"])?;
        let body = self.get_text(url, token).await?;
        serde_json::from_str(&body).map_err(|e| ApiError::InvalidResponse(format!("openTickets: {}", e)))
    }
}
