//! Metric names and recording helpers.
//!
//! Recording goes through the `metrics` facade; without an installed
//! recorder every call is a no-op.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Duration;

/// Completed requests.
pub const REQUESTS_TOTAL: &str = "docgate_requests_total";

/// Request latency in seconds.
pub const REQUEST_DURATION_SECONDS: &str = "docgate_request_duration_seconds";

/// Failed plugin invocations.
pub const PLUGIN_FAILURES_TOTAL: &str = "docgate_plugin_failures_total";

/// Write outcomes.
pub const WRITES_TOTAL: &str = "docgate_writes_total";

/// Registers descriptions for the standard metrics.
pub fn describe_metrics() {
    describe_counter!(REQUESTS_TOTAL, "Total number of completed requests");
    describe_histogram!(
        REQUEST_DURATION_SECONDS,
        metrics::Unit::Seconds,
        "Request duration"
    );
    describe_counter!(PLUGIN_FAILURES_TOTAL, "Plugin invocations that failed");
    describe_counter!(WRITES_TOTAL, "Writes by operation and outcome");
}

/// Records a completed request.
pub fn record_request(service: &str, status: u16, duration: Duration) {
    counter!(
        REQUESTS_TOTAL,
        "service" => service.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!(REQUEST_DURATION_SECONDS, "service" => service.to_string())
        .record(duration.as_secs_f64());
}

/// Records a failed plugin invocation.
pub fn record_plugin_failure(kind: &'static str, plugin: &str) {
    counter!(PLUGIN_FAILURES_TOTAL, "kind" => kind, "plugin" => plugin.to_string()).increment(1);
}

/// Records the outcome of a write.
pub fn record_write(op: &'static str, outcome: &'static str) {
    counter!(WRITES_TOTAL, "op" => op, "outcome" => outcome).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert_eq!(PLUGIN_FAILURES_TOTAL, "docgate_plugin_failures_total");
        assert_eq!(WRITES_TOTAL, "docgate_writes_total");
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        describe_metrics();
        record_request("documents", 200, Duration::from_millis(3));
        record_plugin_failure("hook", "snooper");
        record_write("upsert", "applied");
    }
}
