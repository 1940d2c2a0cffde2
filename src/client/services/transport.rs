//! Real-time message transport shared by every chat view.
//!
//! One physical connection per application session fans inbound events out to
//! logical per-ticket subscriptions. Views hold a [`Subscription`]; dropping
//! it deregisters the filter.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::mpsc;

use crate::client::models::chat_message::ChatEvent;
use crate::client::services::outbox::Outbox;
use crate::common::error::TransportError;

pub type SubscriptionId = u64;

struct SubscriptionEntry {
    ticket_id: String,
    sender: mpsc::UnboundedSender<ChatEvent>,
}

/// Ticket filters of all live subscriptions.
#[derive(Default)]
pub struct SubscriptionRegistry {
    next_id: AtomicU64,
    entries: Mutex<HashMap<SubscriptionId, SubscriptionEntry>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn subscribe(self: &Arc<Self>, ticket_id: &str) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().insert(
            id,
            SubscriptionEntry {
                ticket_id: ticket_id.to_string(),
                sender: tx,
            },
        );
        log::debug!("[TRANSPORT] Subscription {} registered for ticket {}", id, ticket_id);

        Subscription {
            id,
            ticket_id: ticket_id.to_string(),
            receiver: rx,
            registry: Arc::downgrade(self),
        }
    }

    /// Removes the filter. Returns false when it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.lock().remove(&id).is_some();
        if removed {
            log::debug!("[TRANSPORT] Subscription {} removed", id);
        }
        removed
    }

    /// Delivers `event` to every subscription of its ticket and returns how
    /// many received it. Entries whose receiver is gone are pruned.
    pub fn dispatch(&self, event: &ChatEvent) -> usize {
        let mut entries = self.lock();
        let mut delivered = 0;
        entries.retain(|id, entry| {
            if entry.ticket_id != event.ticket_id {
                return true;
            }
            match entry.sender.send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => {
                    log::warn!("[TRANSPORT] Pruning subscription {} with a dropped receiver", id);
                    false
                }
            }
        });
        delivered
    }

    pub fn active(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SubscriptionId, SubscriptionEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Receiving end of one ticket filter. Deregisters itself on drop.
pub struct Subscription {
    id: SubscriptionId,
    ticket_id: String,
    receiver: mpsc::UnboundedReceiver<ChatEvent>,
    registry: Weak<SubscriptionRegistry>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn ticket_id(&self) -> &str {
        &self.ticket_id
    }

    /// Waits for the next event. `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<ChatEvent> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ChatEvent> {
        self.receiver.try_recv().ok()
    }

}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unsubscribe(self.id);
        }
    }
}

/// The seam chat views talk to. [`MessageTransport`] is the real thing;
/// tests plug in recording fakes.
pub trait ChatTransport: Send + Sync {
    fn registry(&self) -> &Arc<SubscriptionRegistry>;

    /// Fire-and-forget emit of an outbound `"message"` event.
    fn send(&self, event: ChatEvent) -> Result<(), TransportError>;

    fn subscribe(&self, ticket_id: &str) -> Subscription {
        self.registry().subscribe(ticket_id)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.registry().unsubscribe(id)
    }
}

struct LinkState {
    outgoing: Option<mpsc::UnboundedSender<ChatEvent>>,
    outbox: Outbox,
}

/// Transport backed by whatever connection driver attaches to it (the
/// WebSocket client in production). While detached, sends go to the outbox.
pub struct MessageTransport {
    registry: Arc<SubscriptionRegistry>,
    link: Mutex<LinkState>,
}

impl MessageTransport {
    pub fn new(outbox_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            registry: SubscriptionRegistry::new(),
            link: Mutex::new(LinkState {
                outgoing: None,
                outbox: Outbox::new(outbox_capacity),
            }),
        })
    }

    fn link(&self) -> std::sync::MutexGuard<'_, LinkState> {
        self.link.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_connected(&self) -> bool {
        self.link().outgoing.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Number of events waiting in the outbox.
    pub fn pending(&self) -> usize {
        self.link().outbox.len()
    }

    /// Installs a live connection and flushes the outbox through it, oldest
    /// first. Returns how many queued events were flushed.
    pub fn attach(&self, outgoing: mpsc::UnboundedSender<ChatEvent>) -> usize {
        let mut link = self.link();
        let queued = link.outbox.drain();
        let total = queued.len();

        let mut iter = queued.into_iter();
        let mut flushed = 0;
        while let Some(event) = iter.next() {
            if let Err(mpsc::error::SendError(event)) = outgoing.send(event) {
                let mut rest = vec![event];
                rest.extend(iter);
                let kept = rest.len();
                let dropped = link.outbox.restore(rest);
                log::warn!(
                    "[TRANSPORT] Connection closed during flush, {} events kept, {} dropped",
                    kept - dropped,
                    dropped
                );
                return flushed;
            }
            flushed += 1;
        }

        if total > 0 {
            log::info!("[TRANSPORT] Flushed {} queued events after reconnect", flushed);
        }
        link.outgoing = Some(outgoing);
        flushed
    }

    /// Drops the live connection; further sends are queued.
    pub fn detach(&self) {
        if self.link().outgoing.take().is_some() {
            log::info!("[TRANSPORT] Connection detached");
        }
    }

    /// Puts events the connection failed to write back at the head of the
    /// outbox. Returns how many did not fit and were dropped.
    pub fn requeue(&self, events: Vec<ChatEvent>) -> usize {
        if events.is_empty() {
            return 0;
        }
        log::warn!("[TRANSPORT] Requeueing {} unsent events", events.len());
        let dropped = self.link().outbox.restore(events);
        if dropped > 0 {
            log::error!("[TRANSPORT] Outbox full, {} unsent events lost", dropped);
        }
        dropped
    }

    /// Entry point for inbound events from the connection.
    pub fn deliver(&self, event: ChatEvent) -> usize {
        let delivered = self.registry.dispatch(&event);
        if delivered == 0 {
            log::debug!("[TRANSPORT] No subscriber for ticket {}", event.ticket_id);
        }
        delivered
    }
}

impl ChatTransport for MessageTransport {
    fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    fn send(&self, event: ChatEvent) -> Result<(), TransportError> {
        let mut link = self.link();

        let mut event = event;
        if let Some(tx) = link.outgoing.take() {
            match tx.send(event) {
                Ok(()) => {
                    link.outgoing = Some(tx);
                    return Ok(());
                }
                Err(mpsc::error::SendError(unsent)) => {
                    log::warn!("[TRANSPORT] Connection gone, queueing message for ticket {}", unsent.ticket_id);
                    event = unsent;
                }
            }
        }

        link.outbox.push(event)?;
        log::debug!("[TRANSPORT] Offline, {} events queued", link.outbox.len());
        Ok(())
    }
}
