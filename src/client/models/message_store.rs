use crate::client::models::chat_message::{ChatMessage, MessageOrigin};

/// Outcome of applying an inbound message to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Appended,
    /// An optimistic entry at this index was promoted to server-confirmed.
    Confirmed(usize),
    /// The message belongs to another ticket.
    Dropped,
}

/// Messages of one ticket, in arrival order. Never re-sorted by timestamp.
#[derive(Debug, Clone)]
pub struct MessageStore {
    ticket_id: String,
    messages: Vec<ChatMessage>,
}

impl MessageStore {
    pub fn new(ticket_id: impl Into<String>) -> Self {
        Self {
            ticket_id: ticket_id.into(),
            messages: Vec::new(),
        }
    }

    pub fn ticket_id(&self) -> &str {
        &self.ticket_id
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn append(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Appends only when the message belongs to this store's ticket.
    pub fn append_if_matching_ticket(&mut self, message: ChatMessage) -> bool {
        if message.ticket_id != self.ticket_id {
            log::debug!(
                "[STORE] Dropping message for ticket {} in store for {}",
                message.ticket_id,
                self.ticket_id
            );
            return false;
        }
        self.append(message);
        true
    }

    /// Places fetched history ahead of anything already in the store.
    /// Records for other tickets are skipped.
    pub fn load_history(&mut self, history: Vec<ChatMessage>) {
        let pending = std::mem::take(&mut self.messages);
        self.messages = history
            .into_iter()
            .filter(|m| m.ticket_id == self.ticket_id)
            .collect();
        self.messages.extend(pending);
    }

    /// Promotes the optimistic entry whose id matches the inbound message's
    /// `client_id`. Returns the index of the promoted entry.
    pub fn reconcile(&mut self, confirmed: &ChatMessage) -> Option<usize> {
        let client_id = confirmed.client_id.as_deref()?;
        let index = self
            .messages
            .iter()
            .position(|m| m.is_optimistic() && m.id == client_id)?;

        let entry = &mut self.messages[index];
        entry.id = confirmed.id.clone();
        entry.created_at = confirmed.created_at;
        entry.origin = MessageOrigin::ServerConfirmed;
        Some(index)
    }

    /// Inbound path: reconcile against an optimistic entry when the server
    /// echoed its id, otherwise append if the ticket matches.
    pub fn apply_inbound(&mut self, message: ChatMessage) -> Applied {
        if message.ticket_id != self.ticket_id {
            return Applied::Dropped;
        }
        if let Some(index) = self.reconcile(&message) {
            return Applied::Confirmed(index);
        }
        if self.append_if_matching_ticket(message) {
            Applied::Appended
        } else {
            Applied::Dropped
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::models::session::User;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeSet;

    fn confirmed(id: &str, ticket: &str, text: &str, secs: i64) -> ChatMessage {
        ChatMessage {
            id: id.to_string(),
            ticket_id: ticket.to_string(),
            author_id: "s1".to_string(),
            author_name: "service".to_string(),
            text: text.to_string(),
            created_at: Utc.timestamp_opt(secs, 0).unwrap(),
            origin: MessageOrigin::ServerConfirmed,
            client_id: None,
        }
    }

    fn anna() -> User {
        User {
            id: "u1".to_string(),
            username: "anna".to_string(),
            permissions: BTreeSet::new(),
        }
    }

    #[test]
    fn keeps_arrival_order_not_timestamp_order() {
        let mut store = MessageStore::new("abc123");
        store.append(confirmed("2", "abc123", "later", 200));
        store.append(confirmed("1", "abc123", "earlier", 100));
        let ids: Vec<_> = store.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["2", "1"]);
    }

    #[test]
    fn foreign_ticket_is_dropped() {
        let mut store = MessageStore::new("abc123");
        assert!(!store.append_if_matching_ticket(confirmed("1", "xyz789", "nope", 1)));
        assert_eq!(
            store.apply_inbound(confirmed("2", "xyz789", "nope", 2)),
            Applied::Dropped
        );
        assert!(store.is_empty());
    }

    #[test]
    fn history_goes_before_pending_entries() {
        let mut store = MessageStore::new("abc123");
        store.append(ChatMessage::optimistic("abc123", &anna(), "typed early"));
        store.load_history(vec![
            confirmed("1", "abc123", "Hallo", 1),
            confirmed("x", "other", "skip", 2),
        ]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.messages()[0].id, "1");
        assert!(store.messages()[1].is_optimistic());
    }

    #[test]
    fn echo_with_client_id_confirms_in_place() {
        let mut store = MessageStore::new("abc123");
        let local = ChatMessage::optimistic("abc123", &anna(), "Wie lange?");
        let local_id = local.id.clone();
        store.append(local);
        store.append(confirmed("5", "abc123", "other", 5));

        let mut echo = confirmed("srv-9", "abc123", "Wie lange?", 10);
        echo.client_id = Some(local_id);
        assert_eq!(store.apply_inbound(echo), Applied::Confirmed(0));

        assert_eq!(store.len(), 2);
        assert_eq!(store.messages()[0].id, "srv-9");
        assert_eq!(store.messages()[0].origin, MessageOrigin::ServerConfirmed);
    }

    #[test]
    fn echo_without_client_id_is_appended_again() {
        let mut store = MessageStore::new("abc123");
        store.append(ChatMessage::optimistic("abc123", &anna(), "Hallo"));
        let echo = confirmed("srv-1", "abc123", "Hallo", 10);
        assert_eq!(store.apply_inbound(echo), Applied::Appended);
        assert_eq!(store.len(), 2);
    }
}
