//! Metrics collection and export for Lifesync.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "lifesync_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "lifesync_connections_active";
    pub const ROOMS_ACTIVE: &str = "lifesync_rooms_active";
    pub const COMMANDS_TOTAL: &str = "lifesync_commands_total";
    pub const COMMANDS_REJECTED: &str = "lifesync_commands_rejected_total";
    pub const SNAPSHOTS_SENT: &str = "lifesync_snapshots_sent_total";
    pub const SNAPSHOT_BYTES: &str = "lifesync_snapshot_bytes_total";
    pub const APPLY_SECONDS: &str = "lifesync_apply_seconds";
    pub const ERRORS_TOTAL: &str = "lifesync_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of active connections"
    );
    metrics::describe_gauge!(names::ROOMS_ACTIVE, "Current number of live rooms");
    metrics::describe_counter!(names::COMMANDS_TOTAL, "Total number of applied commands");
    metrics::describe_counter!(
        names::COMMANDS_REJECTED,
        "Total number of inbound messages dropped by the codec"
    );
    metrics::describe_counter!(names::SNAPSHOTS_SENT, "Total number of snapshots written");
    metrics::describe_counter!(names::SNAPSHOT_BYTES, "Total bytes of snapshots written");
    metrics::describe_histogram!(
        names::APPLY_SECONDS,
        "Time spent applying a command to room state, in seconds"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record an applied command.
pub fn record_command(kind: &'static str, seconds: f64) {
    counter!(names::COMMANDS_TOTAL, "kind" => kind).increment(1);
    histogram!(names::APPLY_SECONDS).record(seconds);
}

/// Record an inbound message dropped by the codec.
pub fn record_rejected(reason: &'static str) {
    counter!(names::COMMANDS_REJECTED, "reason" => reason).increment(1);
}

/// Record a snapshot written to a connection.
pub fn record_snapshot(bytes: usize) {
    counter!(names::SNAPSHOTS_SENT).increment(1);
    counter!(names::SNAPSHOT_BYTES).increment(bytes as u64);
}

/// Update the live room count.
pub fn set_active_rooms(count: usize) {
    gauge!(names::ROOMS_ACTIVE).set(count as f64);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Run `f` against a fresh local recorder and render what it recorded.
    pub(crate) fn render(f: impl FnOnce()) -> String {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, f);
        handle.render()
    }

    #[test]
    fn test_metrics_guard() {
        let output = render(|| {
            let _guard = ConnectionMetricsGuard::new();
        });

        assert!(output.contains("lifesync_connections_total 1"), "{output}");
        assert!(output.contains("lifesync_connections_active 0"), "{output}");
    }

    #[test]
    fn test_recorded_values() {
        let output = render(|| {
            record_command("change", 0.001);
            record_command("change", 0.002);
            record_rejected("malformed_command");
            record_snapshot(64);
            set_active_rooms(3);
            record_error("join");
        });

        assert!(output.contains(r#"lifesync_commands_total{kind="change"} 2"#), "{output}");
        assert!(
            output.contains(r#"lifesync_commands_rejected_total{reason="malformed_command"} 1"#),
            "{output}"
        );
        assert!(output.contains("lifesync_snapshots_sent_total 1"), "{output}");
        assert!(output.contains("lifesync_snapshot_bytes_total 64"), "{output}");
        assert!(output.contains("lifesync_rooms_active 3"), "{output}");
        assert!(output.contains(r#"lifesync_errors_total{type="join"} 1"#), "{output}");
        assert!(output.contains("lifesync_apply_seconds_count 2"), "{output}");
    }
}
