//! Dispatch and publish metrics
//!
//! Recorded through the `metrics` facade; the server binary decides whether a
//! Prometheus recorder is installed.

use std::time::Duration;

/// Method label for calls that matched no registered handler
pub const UNKNOWN_METHOD_LABEL: &str = "unknown";

/// Outcome label for a dispatched call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    Ok,
    Error,
    NotFound,
    Aborted,
}

impl DispatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchStatus::Ok => "ok",
            DispatchStatus::Error => "error",
            DispatchStatus::NotFound => "not_found",
            DispatchStatus::Aborted => "aborted",
        }
    }
}

/// Record the outcome of one dispatch
pub fn record_dispatch(method: &str, status: DispatchStatus, duration: Duration) {
    metrics::counter!(
        "httmcp_dispatch_total",
        "method" => method.to_string(),
        "status" => status.as_str(),
    )
    .increment(1);

    metrics::histogram!(
        "httmcp_dispatch_duration_seconds",
        "method" => method.to_string(),
    )
    .record(duration.as_secs_f64());
}

/// Record a publish attempt. `status` is one of ok, failed, skipped, rejected.
pub fn record_publish(event: &str, status: &'static str) {
    metrics::counter!(
        "httmcp_publish_total",
        "event" => event.to_string(),
        "status" => status,
    )
    .increment(1);
}

pub fn record_session_started() {
    metrics::counter!("httmcp_sessions_started_total").increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_labels() {
        assert_eq!(DispatchStatus::Ok.as_str(), "ok");
        assert_eq!(DispatchStatus::NotFound.as_str(), "not_found");
        assert_eq!(DispatchStatus::Aborted.as_str(), "aborted");
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_dispatch("tools/call", DispatchStatus::Error, Duration::from_millis(3));
        record_publish("endpoint", "skipped");
        record_session_started();
    }
}
