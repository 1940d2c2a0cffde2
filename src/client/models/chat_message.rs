use chrono::{DateTime, Local, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::client::models::session::User;

/// Where a message in the store came from. Never sent over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOrigin {
    LocalOptimistic,
    ServerConfirmed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub id: String,
    pub ticket_id: String,
    pub author_id: String,
    pub author_name: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub origin: MessageOrigin,
    /// Locally generated id of the optimistic entry this message answers to,
    /// when the server echoes it back.
    pub client_id: Option<String>,
}

impl ChatMessage {
    /// Builds the optimistic entry for text typed by `author`.
    pub fn optimistic(ticket_id: &str, author: &User, text: &str) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        Self {
            client_id: Some(id.clone()),
            id,
            ticket_id: ticket_id.to_string(),
            author_id: author.id.clone(),
            author_name: author.username.clone(),
            text: text.to_string(),
            created_at: Utc::now(),
            origin: MessageOrigin::LocalOptimistic,
        }
    }

    pub fn is_optimistic(&self) -> bool {
        self.origin == MessageOrigin::LocalOptimistic
    }

    /// Wire payload for this message. The store-local `origin` is not carried.
    pub fn to_event(&self) -> ChatEvent {
        ChatEvent {
            id: match self.origin {
                MessageOrigin::ServerConfirmed => Some(self.id.clone()),
                MessageOrigin::LocalOptimistic => None,
            },
            ticket_id: self.ticket_id.clone(),
            message: self.text.clone(),
            user_id: self.author_id.clone(),
            username: self.author_name.clone(),
            created_at: self.created_at,
            client_id: self.client_id.clone(),
        }
    }

    /// Local wall-clock time as HH:MM.
    pub fn formatted_time(&self) -> String {
        let local = self.created_at.with_timezone(&Local);
        local.format("%H:%M").to_string()
    }
}

/// Payload of the real-time `"message"` event, identical in both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEvent {
    #[serde(default, alias = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub ticket_id: String,
    pub message: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub username: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

impl From<ChatEvent> for ChatMessage {
    fn from(event: ChatEvent) -> Self {
        let id = event
            .id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        Self {
            id,
            ticket_id: event.ticket_id,
            author_id: event.user_id,
            author_name: event.username,
            text: event.message,
            created_at: event.created_at,
            origin: MessageOrigin::ServerConfirmed,
            client_id: event.client_id,
        }
    }
}

/// Accepts RFC 3339 strings as well as epoch milliseconds.
pub fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Millis(i64),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Text(s) => DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom),
        Raw::Millis(ms) => Utc
            .timestamp_millis_opt(ms)
            .single()
            .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {}", ms))),
    }
}
