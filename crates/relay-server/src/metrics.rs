//! Prometheus recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the global Prometheus recorder.
///
/// Call once at startup, before anything is recorded. The handle renders
/// the `/metrics` endpoint.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Events dispatched (counter, labels: event).
pub const RELAY_EVENTS_TOTAL: &str = "relay_events_total";
/// Events answered with an error (counter, labels: event, error_type).
pub const RELAY_EVENT_ERRORS_TOTAL: &str = "relay_event_errors_total";
/// Handler duration (histogram, labels: event).
pub const RELAY_EVENT_DURATION_SECONDS: &str = "relay_event_duration_seconds";
/// Sockets accepted (counter).
pub const RELAY_CONNECTIONS_TOTAL: &str = "relay_connections_total";
/// Sockets closed (counter).
pub const RELAY_DISCONNECTIONS_TOTAL: &str = "relay_disconnections_total";
/// Open sockets (gauge).
pub const RELAY_CONNECTIONS_ACTIVE: &str = "relay_connections_active";
/// Socket lifetime (histogram).
pub const RELAY_CONNECTION_DURATION_SECONDS: &str = "relay_connection_duration_seconds";
/// Outbound frames dropped on full or closed queues (counter).
pub const RELAY_BROADCAST_DROPS_TOTAL: &str = "relay_broadcast_drops_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_without_global_install() {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let output = handle.render();
        assert!(output.is_empty() || output.contains('\n'));
    }

    #[test]
    fn names_are_prefixed_snake_case() {
        let names = [
            RELAY_EVENTS_TOTAL,
            RELAY_EVENT_ERRORS_TOTAL,
            RELAY_EVENT_DURATION_SECONDS,
            RELAY_CONNECTIONS_TOTAL,
            RELAY_DISCONNECTIONS_TOTAL,
            RELAY_CONNECTIONS_ACTIVE,
            RELAY_CONNECTION_DURATION_SECONDS,
            RELAY_BROADCAST_DROPS_TOTAL,
        ];
        for name in names {
            assert!(name.starts_with("relay_"), "{name}");
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "{name}"
            );
        }
    }
}
