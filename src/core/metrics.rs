//! Prometheus metrics for monitoring the proxy.
//!
//! A single process-wide registry (the prometheus default one) holds request,
//! upstream and streaming metrics. It is initialised lazily on first use.

use prometheus::{
    register_gauge_vec, register_histogram_vec, register_int_counter,
    register_int_counter_vec, GaugeVec, HistogramVec, IntCounter, IntCounterVec,
};
use std::sync::OnceLock;

/// Container for all application metrics.
pub struct Metrics {
    /// Total number of requests by method, endpoint and status
    pub request_count: IntCounterVec,

    /// Request duration histogram in seconds
    pub request_duration: HistogramVec,

    /// Number of currently active requests by endpoint
    pub active_requests: GaugeVec,

    /// Upstream call latency until response headers, by endpoint
    pub upstream_latency: HistogramVec,

    /// Failed requests by error category
    pub upstream_errors: IntCounterVec,

    /// SSE lines handled by the re-streamer, by outcome (forwarded/dropped)
    pub sse_lines: IntCounterVec,

    /// Streams aborted mid-flight by an upstream error
    pub stream_errors_total: IntCounter,

    /// Streams abandoned by the downstream client
    pub client_disconnects_total: IntCounter,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Initialize the metrics registry.
///
/// Subsequent calls return the same instance.
pub fn init_metrics() -> &'static Metrics {
    METRICS.get_or_init(|| {
        let request_count = register_int_counter_vec!(
            "openrouter_proxy_requests_total",
            "Total number of requests",
            &["method", "endpoint", "status_code"]
        )
        .expect("Failed to register request_count metric");

        let request_duration = register_histogram_vec!(
            "openrouter_proxy_request_duration_seconds",
            "Request duration in seconds",
            &["method", "endpoint"],
            vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]
        )
        .expect("Failed to register request_duration metric");

        let active_requests = register_gauge_vec!(
            "openrouter_proxy_active_requests",
            "Number of active requests",
            &["endpoint"]
        )
        .expect("Failed to register active_requests metric");

        let upstream_latency = register_histogram_vec!(
            "openrouter_proxy_upstream_latency_seconds",
            "Upstream latency until response headers in seconds",
            &["endpoint"],
            vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]
        )
        .expect("Failed to register upstream_latency metric");

        let upstream_errors = register_int_counter_vec!(
            "openrouter_proxy_errors_total",
            "Failed requests by error category",
            &["category"]
        )
        .expect("Failed to register upstream_errors metric");

        let sse_lines = register_int_counter_vec!(
            "openrouter_proxy_sse_lines_total",
            "SSE lines handled by the re-streamer",
            &["outcome"]
        )
        .expect("Failed to register sse_lines metric");

        let stream_errors_total = register_int_counter!(
            "openrouter_proxy_stream_errors_total",
            "Streams aborted by an upstream error"
        )
        .expect("Failed to register stream_errors_total metric");

        let client_disconnects_total = register_int_counter!(
            "openrouter_proxy_client_disconnects_total",
            "Streams abandoned by the downstream client"
        )
        .expect("Failed to register client_disconnects_total metric");

        Metrics {
            request_count,
            request_duration,
            active_requests,
            upstream_latency,
            upstream_errors,
            sse_lines,
            stream_errors_total,
            client_disconnects_total,
        }
    })
}

/// Get the global metrics instance, initialising it on first use.
pub fn get_metrics() -> &'static Metrics {
    init_metrics()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization() {
        let metrics = init_metrics();
        let metrics2 = get_metrics();
        assert!(std::ptr::eq(metrics, metrics2));
    }

    #[test]
    fn test_request_count_metric() {
        let metrics = init_metrics();
        let labels = ["POST", "/unit-test/request-count", "201"];

        let initial = metrics.request_count.with_label_values(&labels).get();
        metrics.request_count.with_label_values(&labels).inc();
        let after = metrics.request_count.with_label_values(&labels).get();

        assert_eq!(after, initial + 1);
    }

    #[test]
    fn test_request_duration_metric() {
        let metrics = init_metrics();
        let labels = ["GET", "/unit-test/duration"];

        metrics.request_duration.with_label_values(&labels).observe(1.5);
        metrics.request_duration.with_label_values(&labels).observe(2.3);

        let count = metrics
            .request_duration
            .with_label_values(&labels)
            .get_sample_count();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_gather_contains_proxy_metrics() {
        let metrics = init_metrics();
        metrics.client_disconnects_total.inc();

        let families = prometheus::gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "openrouter_proxy_client_disconnects_total"));
    }
}
