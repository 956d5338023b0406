//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Call once at startup before any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// WebSocket connection duration seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Registered sessions (gauge).
pub const SESSIONS_ACTIVE: &str = "sessions_active";
/// Inbound frames handled (counter, labels: kind).
pub const SESSION_FRAMES_TOTAL: &str = "session_frames_total";
/// Inbound frames dropped (counter, labels: reason).
pub const SESSION_FRAMES_DROPPED_TOTAL: &str = "session_frames_dropped_total";
/// Contained handler panics (counter, labels: scope).
pub const HANDLER_FAULTS_TOTAL: &str = "handler_faults_total";
/// Messages delivered to session event callbacks by the bus (counter).
pub const BROADCAST_DELIVERIES_TOTAL: &str = "broadcast_deliveries_total";
/// Client queries issued (counter).
pub const QUERY_REQUESTS_TOTAL: &str = "query_requests_total";
/// Client queries that produced no value (counter, labels: reason).
pub const QUERY_FAILURES_TOTAL: &str = "query_failures_total";
/// Outbound frames dropped on a full or closed queue (counter).
pub const OUTBOUND_FRAMES_DROPPED_TOTAL: &str = "outbound_frames_dropped_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_without_global_install() {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let output = render(&handle);
        assert!(output.is_empty() || output.contains('#') || output.contains('\n'));
    }

    #[test]
    fn metric_constants_are_snake_case() {
        let names = [
            WS_CONNECTIONS_TOTAL,
            WS_DISCONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            WS_CONNECTION_DURATION_SECONDS,
            SESSIONS_ACTIVE,
            SESSION_FRAMES_TOTAL,
            SESSION_FRAMES_DROPPED_TOTAL,
            HANDLER_FAULTS_TOTAL,
            BROADCAST_DELIVERIES_TOTAL,
            QUERY_REQUESTS_TOTAL,
            QUERY_FAILURES_TOTAL,
            OUTBOUND_FRAMES_DROPPED_TOTAL,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
