//! Prometheus metrics recorder and `/metrics` endpoint handler.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Must be called once at startup before any metrics are recorded.
pub fn install_recorder() -> PrometheusHandle {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("failed to install metrics recorder");
    info!("prometheus metrics recorder installed");
    handle
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across modules.

/// Connections accepted total (counter, labels: transport).
pub const RELAY_CONNECTIONS_TOTAL: &str = "relay_connections_total";
/// Connections removed total (counter).
pub const RELAY_DISCONNECTIONS_TOTAL: &str = "relay_disconnections_total";
/// Active registered connections (gauge).
pub const RELAY_CONNECTIONS_ACTIVE: &str = "relay_connections_active";
/// Envelopes handed to connection queues total (counter, labels: kind).
pub const RELAY_PUBLISH_HANDED_TOTAL: &str = "relay_publish_handed_total";
/// Disposable heartbeats dropped on full buffers total (counter).
pub const RELAY_HEARTBEAT_DROPS_TOTAL: &str = "relay_heartbeat_drops_total";
/// Connections evicted total (counter, labels: reason).
pub const RELAY_EVICTIONS_TOTAL: &str = "relay_evictions_total";
/// Notifications persisted and dispatched total (counter, labels: kind).
pub const RELAY_NOTIFICATIONS_TOTAL: &str = "relay_notifications_total";
