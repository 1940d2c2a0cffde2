use std::sync::Arc;

use crate::client::models::chat_message::ChatMessage;
use crate::client::models::session::Session;
use crate::client::services::api_client::ChatApi;
use crate::common::error::ApiError;

/// Fetches the prior messages of a ticket. One attempt, no automatic retry.
#[derive(Clone)]
pub struct HistoryLoader {
    api: Arc<dyn ChatApi>,
}

impl HistoryLoader {
    pub fn new(api: Arc<dyn ChatApi>) -> Self {
        Self { api }
    }

    pub async fn load(&self, ticket_id: &str, session: &Session) -> Result<Vec<ChatMessage>, ApiError> {
        log::info!("[HISTORY] Loading messages for ticket {}", ticket_id);
        match self.api.chat_history(ticket_id, &session.token).await {
            Ok(messages) => {
                log::info!("[HISTORY] Loaded {} messages for ticket {}", messages.len(), ticket_id);
                Ok(messages)
            }
            Err(e) => {
                log::error!("[HISTORY] Failed to load ticket {}: {}", ticket_id, e);
                Err(e)
            }
        }
    }
}
