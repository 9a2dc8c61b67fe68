//! Metrics and observability utilities
//!
//! Prometheus metrics with a shared prefix. Recording is a no-op until a
//! recorder is installed by the gateway.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all Docshelf metrics
pub const METRICS_PREFIX: &str = "docshelf";

/// Histogram buckets for request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001, // 1ms
    0.005, // 5ms
    0.010, // 10ms
    0.025, // 25ms
    0.050, // 50ms
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.500, // 2.5s
    5.000, // 5s
    10.00, // 10s
];

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    describe_counter!(
        format!("{}_search_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of catalog searches"
    );

    describe_histogram!(
        format!("{}_search_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Catalog search latency in seconds"
    );

    describe_counter!(
        format!("{}_documents_published_total", METRICS_PREFIX),
        Unit::Count,
        "Documents published with an uploaded file"
    );

    describe_counter!(
        format!("{}_documents_deleted_total", METRICS_PREFIX),
        Unit::Count,
        "Documents deleted, by mode"
    );

    describe_gauge!(
        format!("{}_duplicates", METRICS_PREFIX),
        Unit::Count,
        "Documents flagged as duplicates in the last pass"
    );

    describe_gauge!(
        format!("{}_missing_files", METRICS_PREFIX),
        Unit::Count,
        "Documents whose artifact was missing at the last reconcile"
    );

    describe_counter!(
        format!("{}_store_writes_total", METRICS_PREFIX),
        Unit::Count,
        "Full collection rewrites"
    );

    describe_counter!(
        format!("{}_emails_sent_total", METRICS_PREFIX),
        Unit::Count,
        "Outbound emails, by status"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

pub fn record_search(duration_secs: f64, result_count: usize) {
    counter!(format!("{}_search_queries_total", METRICS_PREFIX)).increment(1);
    histogram!(format!("{}_search_duration_seconds", METRICS_PREFIX)).record(duration_secs);
    tracing::trace!(result_count, "Search recorded");
}

pub fn record_publish() {
    counter!(format!("{}_documents_published_total", METRICS_PREFIX)).increment(1);
}

pub fn record_delete(mode: &str) {
    counter!(
        format!("{}_documents_deleted_total", METRICS_PREFIX),
        "mode" => mode.to_string()
    )
    .increment(1);
}

pub fn set_duplicates(count: usize) {
    gauge!(format!("{}_duplicates", METRICS_PREFIX)).set(count as f64);
}

pub fn set_missing(count: usize) {
    gauge!(format!("{}_missing_files", METRICS_PREFIX)).set(count as f64);
}

pub fn record_store_write(collection: &str) {
    counter!(
        format!("{}_store_writes_total", METRICS_PREFIX),
        "collection" => collection.to_string()
    )
    .increment(1);
}

pub fn record_email(success: bool) {
    let status = if success { "success" } else { "error" };
    counter!(
        format!("{}_emails_sent_total", METRICS_PREFIX),
        "status" => status
    )
    .increment(1);
}
