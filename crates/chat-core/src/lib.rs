pub mod chat_state;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod session;
pub mod tcp_transport;
pub mod transport;
