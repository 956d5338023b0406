//! Session timing settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing applied to every session.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Delay before the first-contact callback fires.
    pub settle_delay_ms: u64,
    /// Default interval of the periodic tick when the application sets none.
    pub tick_interval_ms: u64,
    /// Upper bound on a client query; `0` or `null` waits until teardown.
    pub query_timeout_ms: Option<u64>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            settle_delay_ms: 250,
            tick_interval_ms: 24 * 60 * 60 * 1000,
            query_timeout_ms: Some(30_000),
        }
    }
}

impl SessionSettings {
    /// Settle delay as a `Duration`.
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Default tick interval as a `Duration`.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Query timeout as a `Duration`, if bounded.
    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}
