use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use crate::client::models::chat_message::ChatEvent;
use crate::client::services::message_parser::{self, InboundFrame};
use crate::client::services::transport::MessageTransport;
use crate::common::config::ClientConfig;
use crate::common::error::TransportError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

const AUTH_TIMEOUT: Duration = Duration::from_secs(10);
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Reconnecting,
    /// Gave up after the configured number of attempts.
    Failed(String),
    Closed,
}

/// Drives the one physical WebSocket connection behind a [`MessageTransport`]:
/// authenticates, pumps frames both ways and reconnects with backoff.
pub struct WebSocketClient {
    url: String,
    session_token: Option<String>,
    max_retry_attempts: u32,
    base_retry_delay: Duration,
    retry_delay: Duration,
    max_retry_delay: Duration,
    transport: Arc<MessageTransport>,
}

impl WebSocketClient {
    pub fn new(url: String, transport: Arc<MessageTransport>) -> Self {
        let cfg = ClientConfig::default();
        Self {
            url,
            session_token: None,
            max_retry_attempts: cfg.max_retry_attempts,
            base_retry_delay: cfg.retry_delay,
            retry_delay: cfg.retry_delay,
            max_retry_delay: cfg.max_retry_delay,
            transport,
        }
    }

    pub fn from_config(cfg: &ClientConfig, transport: Arc<MessageTransport>) -> Self {
        Self {
            url: cfg.websocket_url.clone(),
            session_token: None,
            max_retry_attempts: cfg.max_retry_attempts.max(1),
            base_retry_delay: cfg.retry_delay,
            retry_delay: cfg.retry_delay,
            max_retry_delay: cfg.max_retry_delay,
            transport,
        }
    }

    pub fn set_session_token(&mut self, token: String) {
        self.session_token = Some(token);
    }

    pub fn with_retry(mut self, attempts: u32, delay: Duration, max_delay: Duration) -> Self {
        self.max_retry_attempts = attempts.max(1);
        self.base_retry_delay = delay;
        self.retry_delay = delay;
        self.max_retry_delay = max_delay;
        self
    }

    pub fn reset_retry_delay(&mut self) {
        self.retry_delay = self.base_retry_delay;
    }

    /// Connects and authenticates, retrying with exponential backoff.
    pub async fn connect_with_auth(&mut self) -> Result<(WsSink, WsSource), TransportError> {
        let mut last_error = TransportError::ConnectionFailed("no attempt made".to_string());

        for attempt in 1..=self.max_retry_attempts {
            match self.try_connect().await {
                Ok(parts) => {
                    self.reset_retry_delay();
                    log::info!("[WS:CLIENT] Connected and authenticated on {}", self.url);
                    return Ok(parts);
                }
                Err(TransportError::AuthenticationFailed(reason)) => {
                    // A rejected token does not get better by retrying.
                    log::error!("[WS:CLIENT] Authentication rejected: {}", reason);
                    return Err(TransportError::AuthenticationFailed(reason));
                }
                Err(e) => {
                    log::warn!("[WS:CLIENT] Connection attempt {} failed: {}", attempt, e);
                    last_error = e;

                    if attempt < self.max_retry_attempts {
                        log::info!("[WS:CLIENT] Retrying in {:?}...", self.retry_delay);
                        tokio::time::sleep(self.retry_delay).await;
                        self.retry_delay = std::cmp::min(self.retry_delay * 2, self.max_retry_delay);
                    }
                }
            }
        }

        Err(last_error)
    }

    async fn try_connect(&self) -> Result<(WsSink, WsSource), TransportError> {
        let token = self
            .session_token
            .clone()
            .ok_or_else(|| TransportError::AuthenticationFailed("no session token provided".to_string()))?;

        log::debug!("[WS:CLIENT] Connecting to {}", self.url);
        let (ws_stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let auth_json = message_parser::encode_auth(&token)?;
        ws_sender
            .send(Message::Text(auth_json))
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("failed to send auth: {}", e)))?;

        let response = tokio::time::timeout(AUTH_TIMEOUT, async {
            loop {
                match ws_receiver.next().await {
                    Some(Ok(Message::Text(text))) => match message_parser::parse_frame(&text) {
                        Ok(InboundFrame::AuthResponse(resp)) => return Ok(resp),
                        Ok(other) => log::debug!("[WS:CLIENT] Ignoring frame before auth: {:?}", other),
                        Err(e) => log::warn!("[WS:CLIENT] Ignoring unparsable frame before auth: {}", e),
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        return Err(TransportError::ConnectionFailed(
                            "server closed connection during auth".to_string(),
                        ))
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(TransportError::ConnectionFailed(e.to_string())),
                }
            }
        })
        .await
        .map_err(|_| TransportError::Timeout)??;

        if response.success {
            log::info!("[WS:CLIENT] Authentication successful for user {:?}", response.user_id);
            Ok((ws_sender, ws_receiver))
        } else {
            Err(TransportError::AuthenticationFailed(
                response.error.unwrap_or_else(|| "unknown authentication error".to_string()),
            ))
        }
    }

    /// Starts the connection supervisor. The transport stays usable
    /// throughout; sends made while down are queued in its outbox and flushed
    /// after each successful (re)connect.
    pub fn spawn(mut self) -> ConnectionHandle {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            loop {
                let connect = tokio::select! {
                    res = self.connect_with_auth() => res,
                    _ = &mut shutdown_rx => break,
                };

                let (ws_sender, ws_receiver) = match connect {
                    Ok(parts) => parts,
                    Err(e) => {
                        log::error!("[WS:CLIENT] Giving up on {}: {}", self.url, e);
                        let _ = state_tx.send(ConnectionState::Failed(e.to_string()));
                        return;
                    }
                };

                let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel::<ChatEvent>();
                self.transport.attach(outgoing_tx);
                let _ = state_tx.send(ConnectionState::Connected);

                let mut writer = tokio::spawn(Self::handle_outgoing_messages(
                    ws_sender,
                    outgoing_rx,
                    self.transport.clone(),
                ));
                let mut reader = tokio::spawn(Self::handle_incoming_messages(ws_receiver, self.transport.clone()));

                let shutting_down = tokio::select! {
                    _ = &mut reader => false,
                    _ = &mut writer => false,
                    _ = &mut shutdown_rx => true,
                };

                // Closing the channel lets the writer drain, send a close frame
                // and hand back anything it could not write.
                self.transport.detach();
                reader.abort();
                if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await.is_err() {
                    writer.abort();
                }

                if shutting_down {
                    break;
                }
                log::warn!("[WS:CLIENT] Connection lost, reconnecting");
                let _ = state_tx.send(ConnectionState::Reconnecting);
            }

            self.transport.detach();
            let _ = state_tx.send(ConnectionState::Closed);
            log::info!("[WS:CLIENT] Connection supervisor stopped");
        });

        ConnectionHandle {
            state: state_rx,
            shutdown: Some(shutdown_tx),
            task,
        }
    }

    async fn handle_outgoing_messages(
        mut ws_sender: WsSink,
        mut outgoing_rx: mpsc::UnboundedReceiver<ChatEvent>,
        transport: Arc<MessageTransport>,
    ) {
        log::debug!("[WS:CLIENT] Starting outgoing message handler");
        while let Some(event) = outgoing_rx.recv().await {
            let json = match message_parser::encode_message(&event) {
                Ok(json) => json,
                Err(e) => {
                    log::error!("[WS:CLIENT] Dropping unserializable message: {}", e);
                    continue;
                }
            };

            if let Err(e) = ws_sender.send(Message::Text(json)).await {
                log::warn!("[WS:CLIENT] Failed to send message: {}", e);
                transport.detach();
                outgoing_rx.close();
                let mut unsent = vec![event];
                while let Ok(rest) = outgoing_rx.try_recv() {
                    unsent.push(rest);
                }
                transport.requeue(unsent);
                return;
            }
        }

        let _ = ws_sender.send(Message::Close(None)).await;
        log::debug!("[WS:CLIENT] Outgoing message handler ended");
    }

    async fn handle_incoming_messages(mut ws_receiver: WsSource, transport: Arc<MessageTransport>) {
        log::debug!("[WS:CLIENT] Starting incoming message handler");
        while let Some(message) = ws_receiver.next().await {
            match message {
                Ok(Message::Text(text)) => match message_parser::parse_frame(&text) {
                    Ok(InboundFrame::Message(event)) => {
                        transport.deliver(event);
                    }
                    Ok(InboundFrame::AuthResponse(_)) => {
                        log::debug!("[WS:CLIENT] Ignoring late auth_response");
                    }
                    Ok(InboundFrame::Other(event)) => {
                        log::trace!("[WS:CLIENT] Ignoring event '{}'", event);
                    }
                    Err(e) => {
                        log::warn!("[WS:CLIENT] Failed to parse frame: {} - raw: {}", e, text);
                    }
                },
                Ok(Message::Close(_)) => {
                    log::info!("[WS:CLIENT] Connection closed by server");
                    break;
                }
                Ok(_) => {
                    // binary, ping and pong frames are not part of the chat channel
                }
                Err(e) => {
                    log::warn!("[WS:CLIENT] WebSocket error: {}", e);
                    break;
                }
            }
        }
        log::debug!("[WS:CLIENT] Incoming message handler ended");
    }
}

/// Owner-side handle of the connection supervisor. Shut it down at app exit.
pub struct ConnectionHandle {
    state: watch::Receiver<ConnectionState>,
    shutdown: Option<oneshot::Sender<()>>,
    task: tokio::task::JoinHandle<()>,
}

impl ConnectionHandle {
    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Resolves once the connection reaches a state matching `pred`.
    pub async fn wait_for(&mut self, pred: impl Fn(&ConnectionState) -> bool) -> ConnectionState {
        loop {
            {
                let current = self.state.borrow_and_update();
                if pred(&current) {
                    return (*current).clone();
                }
            }
            if self.state.changed().await.is_err() {
                return self.state.borrow().clone();
            }
        }
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            if !e.is_cancelled() {
                log::error!("[WS:CLIENT] Supervisor task failed: {}", e);
            }
        }
    }
}
