//! # liveview-settings
//!
//! Configuration with layered sources for the liveview runtime.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`LiveviewSettings::default()`]
//! 2. **User file**: `~/.liveview/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `LIVEVIEW_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

use std::sync::OnceLock;

static SETTINGS: OnceLock<LiveviewSettings> = OnceLock::new();

/// Get the global settings instance.
///
/// Loads from `~/.liveview/settings.json` with env overrides on first call
/// and falls back to compiled defaults if loading fails.
pub fn get_settings() -> &'static LiveviewSettings {
    SETTINGS.get_or_init(|| load_settings().unwrap_or_default())
}

/// Initialize the global settings with a specific value.
///
/// Returns the settings back if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: LiveviewSettings) -> std::result::Result<(), LiveviewSettings> {
    SETTINGS.set(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        let settings = LiveviewSettings::default();
        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.server.ws_path, "/ws_goliveview");
        assert_eq!(settings.session.settle_delay_ms, 250);
        assert_eq!(settings.session.tick_interval_ms, 86_400_000);
        assert_eq!(settings.session.query_timeout_ms, Some(30_000));
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn deep_merge_re_exported() {
        let merged = deep_merge(serde_json::json!({"x": 1}), serde_json::json!({"y": 2}));
        assert_eq!(merged["x"], 1);
        assert_eq!(merged["y"], 2);
    }
}
