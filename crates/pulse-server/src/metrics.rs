//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render `/metrics`. Must be called once at
/// startup before any metrics are recorded.
pub fn install_recorder() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install metrics recorder");
    info!("prometheus metrics recorder installed");
    handle
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
/// Connection lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Outbound frames dropped on a full or closed queue (counter).
pub const WS_OUTBOUND_DROPS_TOTAL: &str = "ws_outbound_drops_total";
/// Inbound frames received (counter).
pub const WS_MESSAGES_RECEIVED_TOTAL: &str = "ws_messages_received_total";
/// Inbound frames rejected (counter, labels: code).
pub const WS_INVALID_MESSAGES_TOTAL: &str = "ws_invalid_messages_total";
/// Connections held by the hub registry (gauge).
pub const HUB_CONNECTIONS: &str = "hub_connections";
/// Analysis requests submitted by the hub (counter, labels: outcome).
pub const HUB_ANALYSES_TOTAL: &str = "hub_analyses_total";
/// Response frames pushed by the hub (counter, labels: source).
pub const HUB_RESPONSES_TOTAL: &str = "hub_responses_total";
/// Analysis results with no live connection (counter).
pub const HUB_RESULTS_DISCARDED_TOTAL: &str = "hub_results_discarded_total";
/// Sessions removed by inactivity cleanup (counter).
pub const SESSIONS_CLEANED_TOTAL: &str = "sessions_cleaned_total";
