// Parsing and encoding of the JSON exchanged with the chat backend
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::models::chat_message::{deserialize_timestamp, ChatEvent, ChatMessage, MessageOrigin};
use crate::common::error::{ApiError, TransportError};

pub const EVENT_MESSAGE: &str = "message";
pub const EVENT_AUTH: &str = "auth";
pub const EVENT_AUTH_RESPONSE: &str = "auth_response";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub event: String,
    pub data: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRequest {
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub success: bool,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Message(ChatEvent),
    AuthResponse(AuthResponse),
    /// Any other event name; the transport ignores these.
    Other(String),
}

/// Parses a text frame received on the real-time channel.
pub fn parse_frame(text: &str) -> Result<InboundFrame, TransportError> {
    let generic: Value = serde_json::from_str(text)
        .map_err(|e| TransportError::InvalidMessage(format!("invalid JSON: {}", e)))?;

    let event = generic
        .get("event")
        .and_then(|v| v.as_str())
        .ok_or_else(|| TransportError::InvalidMessage("missing event field".to_string()))?;

    let data = generic.get("data").cloned().unwrap_or(Value::Null);

    match event {
        EVENT_MESSAGE => {
            let event = serde_json::from_value::<ChatEvent>(data)
                .map_err(|e| TransportError::InvalidMessage(format!("bad message payload: {}", e)))?;
            if event.message.trim().is_empty() {
                return Err(TransportError::InvalidMessage(format!(
                    "empty message for ticket {}",
                    event.ticket_id
                )));
            }
            Ok(InboundFrame::Message(event))
        }
        EVENT_AUTH_RESPONSE => serde_json::from_value::<AuthResponse>(data)
            .map(InboundFrame::AuthResponse)
            .map_err(|e| TransportError::InvalidMessage(format!("bad auth_response payload: {}", e))),
        other => Ok(InboundFrame::Other(other.to_string())),
    }
}

pub fn encode_message(event: &ChatEvent) -> Result<String, TransportError> {
    encode(EVENT_MESSAGE, event)
}

pub fn encode_auth(token: &str) -> Result<String, TransportError> {
    encode(EVENT_AUTH, &AuthRequest { token: token.to_string() })
}

fn encode<T: Serialize>(event: &str, data: &T) -> Result<String, TransportError> {
    serde_json::to_string(&Envelope {
        event: event.to_string(),
        data,
    })
    .map_err(|e| TransportError::InvalidMessage(format!("failed to serialize {}: {}", event, e)))
}

/// One record of `GET /api/service/chat/{ticketId}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryRecord {
    #[serde(alias = "_id")]
    id: String,
    #[serde(default)]
    ticket_id: Option<String>,
    #[serde(alias = "text")]
    message: String,
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    username: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HistoryBody {
    List(Vec<HistoryRecord>),
    Wrapped { messages: Vec<HistoryRecord> },
}

/// Parses a history response body, keeping the server's order.
/// Records without a ticket id are attributed to `ticket_id`; records
/// without text are skipped.
pub fn parse_history(body: &str, ticket_id: &str) -> Result<Vec<ChatMessage>, ApiError> {
    let parsed: HistoryBody = serde_json::from_str(body)
        .map_err(|e| ApiError::InvalidResponse(format!("chat history: {}", e)))?;

    let records = match parsed {
        HistoryBody::List(records) => records,
        HistoryBody::Wrapped { messages } => messages,
    };

    Ok(records
        .into_iter()
        .filter(|r| {
            let keep = !r.message.trim().is_empty();
            if !keep {
                log::warn!("[HISTORY] Skipping record {} without text", r.id);
            }
            keep
        })
        .map(|r| ChatMessage {
            id: r.id,
            ticket_id: r.ticket_id.unwrap_or_else(|| ticket_id.to_string()),
            author_id: r.user_id,
            author_name: r.username,
            text: r.message,
            created_at: r.created_at,
            origin: MessageOrigin::ServerConfirmed,
            client_id: None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_message_frame() {
        let frame = parse_frame(
            r#"{"event":"message","data":{"ticketId":"abc123","message":"Fertig!","userId":"s1","username":"service","createdAt":"2024-05-01T10:00:00Z"}}"#,
        )
        .unwrap();
        match frame {
            InboundFrame::Message(ev) => {
                assert_eq!(ev.ticket_id, "abc123");
                assert_eq!(ev.message, "Fertig!");
                assert!(ev.client_id.is_none());
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[test]
    fn unknown_events_are_passed_through_as_other() {
        let frame = parse_frame(r#"{"event":"typing","data":{"ticketId":"abc123"}}"#).unwrap();
        assert_eq!(frame, InboundFrame::Other("typing".to_string()));
    }

    #[test]
    fn rejects_frames_without_event() {
        assert!(matches!(
            parse_frame(r#"{"data":{}}"#),
            Err(TransportError::InvalidMessage(_))
        ));
        assert!(parse_frame("not json").is_err());
    }

    #[test]
    fn auth_round_trip_shape() {
        let auth: Value = serde_json::from_str(&encode_auth("tok").unwrap()).unwrap();
        assert_eq!(auth["event"], "auth");
        assert_eq!(auth["data"]["token"], "tok");

        let resp = parse_frame(r#"{"event":"auth_response","data":{"success":false,"error":"expired"}}"#).unwrap();
        assert_eq!(
            resp,
            InboundFrame::AuthResponse(AuthResponse {
                success: false,
                user_id: None,
                error: Some("expired".to_string()),
            })
        );
    }

    #[test]
    fn history_accepts_bare_and_wrapped_lists() {
        let bare = r#"[{"_id":"1","message":"Hallo","userId":"s1","username":"service","createdAt":"2024-05-01T10:00:00Z"}]"#;
        let msgs = parse_history(bare, "abc123").unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].id, "1");
        assert_eq!(msgs[0].ticket_id, "abc123");
        assert_eq!(msgs[0].origin, MessageOrigin::ServerConfirmed);

        let wrapped = r#"{"messages":[
            {"id":"2","ticketId":"abc123","text":"b","createdAt":1700000001000},
            {"id":"1","ticketId":"abc123","text":"a","createdAt":1700000000000}
        ]}"#;
        let msgs = parse_history(wrapped, "abc123").unwrap();
        let ids: Vec<_> = msgs.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["2", "1"]);
    }

    #[test]
    fn empty_messages_are_rejected() {
        let frame = parse_frame(
            r#"{"event":"message","data":{"ticketId":"abc123","message":"  ","createdAt":"2024-05-01T10:00:00Z"}}"#,
        );
        assert!(matches!(frame, Err(TransportError::InvalidMessage(_))));

        let body = r#"[
            {"_id":"1","message":"","createdAt":"2024-05-01T10:00:00Z"},
            {"_id":"2","message":"Hallo","createdAt":"2024-05-01T10:01:00Z"}
        ]"#;
        let msgs = parse_history(body, "abc123").unwrap();
        let ids: Vec<_> = msgs.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["2"]);
    }

    #[test]
    fn history_garbage_is_invalid_response() {
        assert!(matches!(
            parse_history("{\"error\":\"boom\"}", "abc123"),
            Err(ApiError::InvalidResponse(_))
        ));
    }
}
