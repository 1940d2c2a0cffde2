//! Controller of one mounted ticket chat: history, live events and the
//! composer with optimistic send.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::client::models::chat_message::{ChatEvent, ChatMessage};
use crate::client::models::message_store::{Applied, MessageStore};
use crate::client::models::session::Session;
use crate::client::services::history_loader::HistoryLoader;
use crate::client::services::transport::{ChatTransport, Subscription, SubscriptionId};
use crate::common::error::ApiError;

/// Side effects the view layer has to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewSignal {
    ScrollToEnd,
    /// One-shot user-visible error.
    Alert(String),
}

/// Lets the owner tear a view down from outside its task, e.g. while the
/// history fetch is still pending.
#[derive(Clone)]
pub struct ViewHandle {
    mounted: Arc<AtomicBool>,
    subscription_id: SubscriptionId,
    transport: Arc<dyn ChatTransport>,
}

impl ViewHandle {
    pub fn unmount(&self) {
        if self.mounted.swap(false, Ordering::SeqCst) {
            self.transport.unsubscribe(self.subscription_id);
            log::debug!("[CHAT_VIEW] Unmounted (subscription {})", self.subscription_id);
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }
}

pub struct ChatView {
    store: MessageStore,
    session: Session,
    pending: String,
    subscription: Subscription,
    transport: Arc<dyn ChatTransport>,
    signals: mpsc::UnboundedSender<ViewSignal>,
    mounted: Arc<AtomicBool>,
    history_settled: bool,
}

impl ChatView {
    /// Creates the view with an empty store and subscribes to its ticket.
    /// Inbound events are buffered until history has been loaded.
    pub fn new(
        ticket_id: &str,
        session: Session,
        transport: Arc<dyn ChatTransport>,
        signals: mpsc::UnboundedSender<ViewSignal>,
    ) -> (Self, ViewHandle) {
        let subscription = transport.subscribe(ticket_id);
        let mounted = Arc::new(AtomicBool::new(true));

        let handle = ViewHandle {
            mounted: mounted.clone(),
            subscription_id: subscription.id(),
            transport: transport.clone(),
        };

        let view = Self {
            store: MessageStore::new(ticket_id),
            session,
            pending: String::new(),
            subscription,
            transport,
            signals,
            mounted,
            history_settled: false,
        };
        (view, handle)
    }

    /// `new` followed by the history load. A failed load still yields a
    /// usable view with an empty store; the alert has already been signalled.
    pub async fn mount(
        ticket_id: &str,
        session: Session,
        loader: &HistoryLoader,
        transport: Arc<dyn ChatTransport>,
        signals: mpsc::UnboundedSender<ViewSignal>,
    ) -> (Self, ViewHandle) {
        let (mut view, handle) = Self::new(ticket_id, session, transport, signals);
        let _ = view.load_history(loader).await;
        (view, handle)
    }

    pub fn ticket_id(&self) -> &str {
        self.store.ticket_id()
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.store.messages()
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    /// Fetches history once per mount. A result arriving after unmount is
    /// discarded. Returns how many messages were placed in the store.
    pub async fn load_history(&mut self, loader: &HistoryLoader) -> Result<usize, ApiError> {
        if self.history_settled {
            log::warn!("[CHAT_VIEW] History for {} already loaded", self.ticket_id());
            return Ok(0);
        }

        let ticket_id = self.ticket_id().to_string();
        let result = loader.load(&ticket_id, &self.session).await;

        if !self.is_mounted() {
            log::debug!("[CHAT_VIEW] Discarding history for {}: view unmounted", ticket_id);
            return Ok(0);
        }
        self.history_settled = true;

        match result {
            Ok(history) => {
                self.store.load_history(history);
                let loaded = self.store.len();
                if loaded > 0 {
                    self.signal(ViewSignal::ScrollToEnd);
                }
                Ok(loaded)
            }
            Err(e) => {
                self.signal(ViewSignal::Alert(format!("Could not load the conversation: {}", e)));
                Err(e)
            }
        }
    }

    pub fn pending(&self) -> &str {
        &self.pending
    }

    pub fn set_pending(&mut self, text: impl Into<String>) {
        self.pending = text.into();
    }

    /// Submits whatever the composer holds.
    pub fn send_pending(&mut self) -> bool {
        let text = self.pending.clone();
        self.submit(&text)
    }

    /// Optimistic send: the message lands in the store before any network
    /// round-trip, then goes out over the transport. Blank text is a no-op.
    pub fn submit(&mut self, text: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }
        if !self.is_mounted() {
            log::debug!("[CHAT_VIEW] Ignoring submit on unmounted view");
            return false;
        }

        let message = ChatMessage::optimistic(self.ticket_id(), &self.session.user, text);
        let event = message.to_event();
        self.store.append(message);
        self.signal(ViewSignal::ScrollToEnd);

        if let Err(e) = self.transport.send(event) {
            // The optimistic entry stays; nothing is surfaced to the user.
            log::warn!("[CHAT_VIEW] Send for ticket {} failed: {}", self.ticket_id(), e);
        }

        self.pending.clear();
        true
    }

    /// Applies one inbound event. Nothing happens once unmounted.
    pub fn handle_event(&mut self, event: ChatEvent) -> Applied {
        if !self.is_mounted() {
            return Applied::Dropped;
        }
        let applied = self.store.apply_inbound(event.into());
        if applied == Applied::Appended {
            self.signal(ViewSignal::ScrollToEnd);
        }
        applied
    }

    /// Applies every event delivered so far without waiting.
    pub fn drain_inbound(&mut self) -> usize {
        if !self.history_settled {
            return 0;
        }
        let mut applied = 0;
        while let Some(event) = self.subscription.try_recv() {
            if self.handle_event(event) != Applied::Dropped {
                applied += 1;
            }
        }
        applied
    }

    /// Waits for the next delivered event and applies it. `None` once the
    /// subscription has ended or before history is settled.
    pub async fn next_inbound(&mut self) -> Option<Applied> {
        if !self.history_settled {
            log::warn!("[CHAT_VIEW] Inbound processing requested before history load");
            return None;
        }
        let event = self.subscription.recv().await?;
        Some(self.handle_event(event))
    }

    fn signal(&self, signal: ViewSignal) {
        let _ = self.signals.send(signal);
    }
}

impl Drop for ChatView {
    fn drop(&mut self) {
        self.mounted.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::models::chat_message::MessageOrigin;
    use crate::client::models::session::User;
    use crate::client::services::api_client::{ChatApi, OpenTicket};
    use crate::client::services::transport::SubscriptionRegistry;
    use crate::common::error::TransportError;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::BTreeSet;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    struct RecordingTransport {
        registry: Arc<SubscriptionRegistry>,
        sent: Mutex<Vec<ChatEvent>>,
        fail: bool,
    }

    impl RecordingTransport {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                registry: SubscriptionRegistry::new(),
                sent: Mutex::new(Vec::new()),
                fail,
            })
        }

        fn sent(&self) -> Vec<ChatEvent> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl ChatTransport for RecordingTransport {
        fn registry(&self) -> &Arc<SubscriptionRegistry> {
            &self.registry
        }

        fn send(&self, event: ChatEvent) -> Result<(), TransportError> {
            self.sent.lock().unwrap().push(event);
            if self.fail {
                Err(TransportError::Disconnected)
            } else {
                Ok(())
            }
        }
    }

    struct GatedApi {
        history: Option<Vec<ChatMessage>>,
        gate: Option<Notify>,
    }

    #[async_trait]
    impl ChatApi for GatedApi {
        async fn chat_history(&self, ticket_id: &str, _token: &str) -> Result<Vec<ChatMessage>, ApiError> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.history
                .clone()
                .ok_or_else(|| ApiError::NotFound(format!("/api/service/chat/{}", ticket_id)))
        }

        async fn open_ticket(&self, _token: &str) -> Result<OpenTicket, ApiError> {
            Ok(OpenTicket { has_open: false, ticket_id: None })
        }
    }

    fn session() -> Session {
        Session {
            token: "tok".to_string(),
            user: User {
                id: "u1".to_string(),
                username: "anna".to_string(),
                permissions: BTreeSet::new(),
            },
        }
    }

    fn inbound(ticket: &str, text: &str) -> ChatEvent {
        ChatEvent {
            id: Some(format!("srv-{}", text.len())),
            ticket_id: ticket.to_string(),
            message: text.to_string(),
            user_id: "s1".to_string(),
            username: "service".to_string(),
            created_at: Utc::now(),
            client_id: None,
        }
    }

    fn loader(history: Option<Vec<ChatMessage>>) -> HistoryLoader {
        HistoryLoader::new(Arc::new(GatedApi { history, gate: None }))
    }

    #[tokio::test]
    async fn blank_submit_is_a_no_op() {
        let transport = RecordingTransport::new(false);
        let (tx, _rx) = mpsc::unbounded_channel();
        let (mut view, _handle) =
            ChatView::mount("abc123", session(), &loader(Some(vec![])), transport.clone(), tx).await;

        view.set_pending("   ");
        assert!(!view.send_pending());
        assert!(!view.submit(""));
        assert!(view.store().is_empty());
        assert!(transport.sent().is_empty());
        assert_eq!(view.pending(), "   ");
    }

    #[tokio::test]
    async fn submit_appends_optimistically_even_if_send_fails() {
        let transport = RecordingTransport::new(true);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (mut view, _handle) =
            ChatView::mount("abc123", session(), &loader(Some(vec![])), transport.clone(), tx).await;

        view.set_pending("Hallo");
        assert!(view.send_pending());

        assert_eq!(view.store().len(), 1);
        assert_eq!(view.messages()[0].origin, MessageOrigin::LocalOptimistic);
        assert_eq!(view.pending(), "");
        assert_eq!(transport.sent().len(), 1);
        assert_eq!(rx.try_recv().unwrap(), ViewSignal::ScrollToEnd);
    }

    #[tokio::test]
    async fn history_failure_leaves_store_empty_with_one_alert() {
        let transport = RecordingTransport::new(false);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (view, _handle) = ChatView::mount("abc123", session(), &loader(None), transport, tx).await;

        assert_eq!(view.store().len(), 0);
        let signals: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(signals.len(), 1);
        assert!(matches!(signals[0], ViewSignal::Alert(_)));
    }

    #[tokio::test]
    async fn events_wait_for_history() {
        let transport = RecordingTransport::new(false);
        let (tx, _rx) = mpsc::unbounded_channel();
        let (mut view, _handle) = ChatView::new("abc123", session(), transport.clone(), tx);

        transport.registry().dispatch(&inbound("abc123", "early"));
        assert_eq!(view.drain_inbound(), 0);

        let history = vec![ChatMessage::from(inbound("abc123", "Hallo"))];
        view.load_history(&loader(Some(history))).await.unwrap();
        assert_eq!(view.drain_inbound(), 1);

        let texts: Vec<_> = view.messages().iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["Hallo", "early"]);
    }

    #[tokio::test]
    async fn history_arriving_after_unmount_is_discarded() {
        let transport = RecordingTransport::new(false);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (mut view, handle) = ChatView::new("abc123", session(), transport.clone(), tx);

        let api = Arc::new(GatedApi {
            history: Some(vec![ChatMessage::from(inbound("abc123", "Hallo"))]),
            gate: Some(Notify::new()),
        });
        let loader = HistoryLoader::new(api.clone());

        let (loaded, _) = tokio::join!(view.load_history(&loader), async {
            handle.unmount();
            if let Some(gate) = &api.gate {
                gate.notify_one();
            }
        });

        assert_eq!(loaded.unwrap(), 0);
        assert!(view.store().is_empty());
        assert!(rx.try_recv().is_err());
        assert_eq!(transport.registry().active(), 0);
    }

    #[tokio::test]
    async fn unmounted_view_ignores_buffered_events() {
        let transport = RecordingTransport::new(false);
        let (tx, _rx) = mpsc::unbounded_channel();
        let (mut view, handle) =
            ChatView::mount("abc123", session(), &loader(Some(vec![])), transport.clone(), tx).await;

        transport.registry().dispatch(&inbound("abc123", "Fertig!"));
        handle.unmount();
        transport.registry().dispatch(&inbound("abc123", "too late"));

        assert_eq!(view.drain_inbound(), 0);
        assert!(view.store().is_empty());
        assert!(!view.submit("still there?"));
    }

    #[tokio::test]
    async fn dropping_the_view_releases_the_subscription() {
        let transport = RecordingTransport::new(false);
        let (tx, _rx) = mpsc::unbounded_channel();
        let (view, handle) = ChatView::new("abc123", session(), transport.clone(), tx);
        assert_eq!(transport.registry().active(), 1);

        drop(view);
        assert_eq!(transport.registry().active(), 0);
        assert!(!handle.is_mounted());
    }
}
