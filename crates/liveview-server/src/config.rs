//! Runtime configuration derived from [`liveview_settings`].

use std::time::Duration;

use liveview_settings::{LiveviewSettings, ServerSettings, SessionSettings};
use serde::{Deserialize, Serialize};

/// Listener configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` for auto-assign).
    pub port: u16,
    /// Path serving the page shell (when one is configured).
    pub page_path: String,
    /// Path accepting the WebSocket upgrade.
    pub ws_path: String,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Capacity of each connection's outbound queue.
    pub outbound_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&ServerSettings::default())
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            page_path: settings.page_path.clone(),
            ws_path: settings.ws_path.clone(),
            max_message_size: settings.max_message_size,
            outbound_buffer: settings.outbound_buffer,
        }
    }
}

/// Timing applied to each session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Delay before the first-contact callback.
    pub settle_delay: Duration,
    /// Tick interval used when the application does not set one.
    pub tick_interval: Duration,
    /// Upper bound on a client query (`None` waits until teardown).
    pub query_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&SessionSettings::default())
    }
}

impl From<&SessionSettings> for SessionConfig {
    fn from(settings: &SessionSettings) -> Self {
        Self {
            settle_delay: settings.settle_delay(),
            tick_interval: settings.tick_interval(),
            query_timeout: settings.query_timeout(),
        }
    }
}

/// Split loaded settings into the server and session halves.
pub fn from_settings(settings: &LiveviewSettings) -> (ServerConfig, SessionConfig) {
    (
        ServerConfig::from(&settings.server),
        SessionConfig::from(&settings.session),
    )
}
