//! # liveview-server
//!
//! Server-held UI sessions kept in sync with a browser over a WebSocket.
//!
//! - Per-connection session: frame decoding, handler dispatch, client queries
//! - Process-wide session registry with broadcast / targeted fan-out
//! - Per-session scheduler: first-contact and periodic callbacks
//! - Idempotent teardown on disconnect
//! - Axum HTTP surface: WebSocket upgrade, health check, Prometheus metrics

#![deny(unsafe_code)]

pub mod component;
pub mod config;
pub mod fault;
pub mod health;
pub mod metrics;
pub mod registry;
pub mod scheduler;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod teardown;
pub mod websocket;

pub use component::{Component, EventComponent};
pub use config::{ServerConfig, SessionConfig};
pub use registry::SessionRegistry;
pub use server::LiveviewServer;
pub use session::{FirstContact, Session, SessionFactory, SessionHooks, SessionSpec};
