//! WebSocket transport: one session per accepted connection.

pub mod connection;

pub use connection::run_ws_session;
