//! Metrics collection and exposition.
//!
//! # Metrics
//! - `trellis_dispatch_total` (counter): dispatches by method, status
//! - `trellis_dispatch_duration_seconds` (histogram): dispatch latency by method
//! - `trellis_forward_total` (counter): internal forwards
//! - `trellis_pass_total` (counter): routes passed over
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed
//! - Labels stay low-cardinality: method and status, never path

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

pub const DISPATCH_TOTAL: &str = "trellis_dispatch_total";
pub const DISPATCH_DURATION_SECONDS: &str = "trellis_dispatch_duration_seconds";
pub const FORWARD_TOTAL: &str = "trellis_forward_total";
pub const PASS_TOTAL: &str = "trellis_pass_total";

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Prometheus exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one completed dispatch.
pub fn record_dispatch(method: &str, status: u16, start: Instant) {
    counter!(DISPATCH_TOTAL, "method" => method.to_string(), "status" => status.to_string())
        .increment(1);
    histogram!(DISPATCH_DURATION_SECONDS, "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_forward() {
    counter!(FORWARD_TOTAL).increment(1);
}

pub fn record_pass() {
    counter!(PASS_TOTAL).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_dispatch("GET", 200, Instant::now());
        record_forward();
        record_pass();
    }

    #[test]
    fn test_metric_names_are_snake_case() {
        for name in [DISPATCH_TOTAL, DISPATCH_DURATION_SECONDS, FORWARD_TOTAL, PASS_TOTAL] {
            assert!(name.chars().all(|c| c.is_ascii_lowercase() || c == '_'));
        }
    }
}
