//! Listener settings.

use serde::{Deserialize, Serialize};

/// HTTP and WebSocket listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port (`0` auto-assigns).
    pub port: u16,
    /// Path serving the page shell.
    pub page_path: String,
    /// Path accepting the WebSocket upgrade.
    pub ws_path: String,
    /// Largest inbound frame accepted, in bytes.
    pub max_message_size: usize,
    /// Capacity of each connection's outbound frame queue.
    pub outbound_buffer: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            page_path: "/".to_string(),
            ws_path: "/ws_goliveview".to_string(),
            max_message_size: 1024 * 1024,
            outbound_buffer: 1024,
        }
    }
}
