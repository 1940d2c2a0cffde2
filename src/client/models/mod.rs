pub mod capabilities;
pub mod chat_message;
pub mod message_store;
pub mod session;
