pub mod api_client;
pub mod chat_view;
pub mod history_loader;
pub mod message_parser;
pub mod outbox;
pub mod transport;
pub mod websocket_client;
