//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus recorder as the global `metrics` recorder.
///
/// Returns the handle used to render `/metrics`. Fails if a recorder is
/// already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// WebSocket sessions accepted (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket sessions ended (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Open WebSocket sessions (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Session lifetime in seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Sessions in the hub registry (gauge).
pub const HUB_SESSIONS: &str = "hub_sessions";
/// Hub broadcasts issued (counter).
pub const HUB_BROADCASTS_TOTAL: &str = "hub_broadcasts_total";
/// Sessions evicted for a full or closed queue (counter).
pub const HUB_EVICTIONS_TOTAL: &str = "hub_evictions_total";
/// Bus messages bridged to the hub (counter).
pub const BRIDGE_MESSAGES_TOTAL: &str = "bridge_messages_total";
/// Bus messages dropped as malformed (counter).
pub const BRIDGE_MALFORMED_TOTAL: &str = "bridge_malformed_total";
/// Bus messages dropped because the bridge queue was full (counter).
pub const BRIDGE_DROPPED_TOTAL: &str = "bridge_dropped_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_without_global_install() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!(HUB_BROADCASTS_TOTAL).increment(3);
        });
        assert!(handle.render().contains("hub_broadcasts_total 3"));
    }

    #[test]
    fn metric_names_are_snake_case() {
        let names = [
            WS_CONNECTIONS_TOTAL,
            WS_DISCONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            WS_CONNECTION_DURATION_SECONDS,
            HUB_SESSIONS,
            HUB_BROADCASTS_TOTAL,
            HUB_EVICTIONS_TOTAL,
            BRIDGE_MESSAGES_TOTAL,
            BRIDGE_MALFORMED_TOTAL,
            BRIDGE_DROPPED_TOTAL,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "{name}"
            );
        }
    }
}
