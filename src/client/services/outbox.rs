use std::collections::VecDeque;

use crate::client::models::chat_message::ChatEvent;
use crate::common::error::TransportError;

/// Finite FIFO of sends made while the connection was down.
#[derive(Debug)]
pub struct Outbox {
    capacity: usize,
    queue: VecDeque<ChatEvent>,
}

impl Outbox {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            queue: VecDeque::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Queues an event. A full outbox rejects the newcomer.
    pub fn push(&mut self, event: ChatEvent) -> Result<(), TransportError> {
        if self.queue.len() >= self.capacity {
            return Err(TransportError::OutboxFull(self.queue.len()));
        }
        self.queue.push_back(event);
        Ok(())
    }

    /// Takes everything queued, oldest first.
    pub fn drain(&mut self) -> Vec<ChatEvent> {
        self.queue.drain(..).collect()
    }

    /// Puts unsent events back at the head, keeping their order. The bound
    /// still holds: the oldest events win and whatever no longer fits is
    /// dropped from the tail. Returns how many events were dropped.
    pub fn restore(&mut self, events: Vec<ChatEvent>) -> usize {
        for event in events.into_iter().rev() {
            self.queue.push_front(event);
        }

        let dropped = self.queue.len().saturating_sub(self.capacity);
        if dropped > 0 {
            self.queue.truncate(self.capacity);
            log::warn!("[OUTBOX] Over capacity after restore, dropped {} newest events", dropped);
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn event(text: &str) -> ChatEvent {
        ChatEvent {
            id: None,
            ticket_id: "abc123".to_string(),
            message: text.to_string(),
            user_id: "u1".to_string(),
            username: "anna".to_string(),
            created_at: Utc::now(),
            client_id: None,
        }
    }

    #[test]
    fn rejects_when_full() {
        let mut outbox = Outbox::new(2);
        outbox.push(event("a")).unwrap();
        outbox.push(event("b")).unwrap();
        assert!(matches!(outbox.push(event("c")), Err(TransportError::OutboxFull(2))));
        assert_eq!(outbox.len(), 2);
    }

    #[test]
    fn drain_and_restore_keep_fifo_order() {
        let mut outbox = Outbox::new(4);
        for t in ["a", "b", "c"] {
            outbox.push(event(t)).unwrap();
        }
        let mut drained = outbox.drain();
        assert!(outbox.is_empty());

        let unsent = drained.split_off(1);
        outbox.restore(unsent);
        outbox.push(event("d")).unwrap();

        let texts: Vec<_> = outbox.drain().into_iter().map(|e| e.message).collect();
        assert_eq!(texts, ["b", "c", "d"]);
    }

    #[test]
    fn restore_keeps_the_oldest_within_capacity() {
        let mut outbox = Outbox::new(2);
        outbox.push(event("late")).unwrap();

        let dropped = outbox.restore(vec![event("w1"), event("w2"), event("w3")]);
        assert_eq!(dropped, 2);
        assert_eq!(outbox.len(), 2);
        assert!(matches!(outbox.push(event("x")), Err(TransportError::OutboxFull(2))));

        let texts: Vec<_> = outbox.drain().into_iter().map(|e| e.message).collect();
        assert_eq!(texts, ["w1", "w2"]);
    }
}
