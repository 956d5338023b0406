//! Settings type definitions.
//!
//! Field names are camelCase on disk. Every section is `#[serde(default)]`
//! so partial JSON files only need the keys they change.

mod server;
mod session;

pub use server::*;
pub use session::*;

use serde::{Deserialize, Serialize};

/// Root settings type.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LiveviewSettings {
    /// HTTP / WebSocket listener settings.
    pub server: ServerSettings,
    /// Per-session timing.
    pub session: SessionSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of the compact human format.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let settings: LiveviewSettings =
            serde_json::from_str(r#"{"server":{"port":8080}}"#).unwrap();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.session.settle_delay_ms, 250);
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(LiveviewSettings::default()).unwrap();
        assert!(json["server"].get("wsPath").is_some());
        assert!(json["session"].get("queryTimeoutMs").is_some());
    }
}
