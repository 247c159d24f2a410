//! Metrics and observability utilities
//!
//! Provides Prometheus metric descriptions with histogram buckets sized for
//! generative calls, and standardized naming under one prefix.

use crate::errors::{AppError, Result};
use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Instant;

/// Metrics prefix for all Recipe Suggest metrics
pub const METRICS_PREFIX: &str = "recipe_suggest";

/// Histogram buckets for HTTP request latency (in seconds)
///
/// Requests block on one generative call, so the tail reaches the 120s cap.
pub const LATENCY_BUCKETS: &[f64] = &[
    0.010, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.00, 20.00, 30.00, 60.00, 120.0,
];

/// Buckets for generative and image calls
pub const GENERATION_BUCKETS: &[f64] = &[
    0.500, 1.000, 2.000, 5.000, 10.00, 20.00, 30.00, 45.00, 60.00, 90.00, 120.0,
];

/// Install the Prometheus exporter with the shared bucket layout; port 0 disables it
pub fn install_exporter(port: u16) -> Result<()> {
    if port == 0 {
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_request_duration_seconds", METRICS_PREFIX)),
            LATENCY_BUCKETS,
        )
        .and_then(|builder| {
            builder.set_buckets_for_metric(
                Matcher::Suffix("generation_duration_seconds".to_string()),
                GENERATION_BUCKETS,
            )
        })
        .and_then(|builder| {
            builder.set_buckets_for_metric(
                Matcher::Full(format!("{}_image_duration_seconds", METRICS_PREFIX)),
                GENERATION_BUCKETS,
            )
        })
        .and_then(|builder| builder.install())
        .map_err(|e| AppError::Configuration {
            message: format!("Failed to install Prometheus exporter: {}", e),
        })?;

    tracing::info!(port, "Prometheus exporter listening");
    Ok(())
}

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
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

    // Generation metrics
    describe_counter!(
        format!("{}_generation_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total generative API requests"
    );

    describe_counter!(
        format!("{}_generation_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Total generative API failures"
    );

    describe_histogram!(
        format!("{}_generation_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Generative API latency in seconds"
    );

    describe_counter!(
        format!("{}_recipes_generated_total", METRICS_PREFIX),
        Unit::Count,
        "Recipes returned to callers by prompt kind"
    );

    describe_counter!(
        format!("{}_extraction_failures_total", METRICS_PREFIX),
        Unit::Count,
        "Model answers that did not contain the expected JSON"
    );

    describe_counter!(
        format!("{}_reconcile_fail_open_total", METRICS_PREFIX),
        Unit::Count,
        "Reconciliations that returned the required list unchanged after a failure"
    );

    // Image metrics
    describe_counter!(
        format!("{}_image_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total image generation requests"
    );

    describe_counter!(
        format!("{}_image_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Total image generation or upload failures"
    );

    describe_histogram!(
        format!("{}_image_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Image generation and upload latency in seconds"
    );

    // Publishing metrics
    describe_counter!(
        format!("{}_publish_steps_total", METRICS_PREFIX),
        Unit::Count,
        "Publish steps by step and outcome"
    );

    describe_counter!(
        format!("{}_detached_tasks_total", METRICS_PREFIX),
        Unit::Count,
        "Detached tasks by outcome"
    );

    // Enrichment metrics
    describe_counter!(
        format!("{}_enrichments_total", METRICS_PREFIX),
        Unit::Count,
        "Document enrichments by kind and outcome"
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

/// Record the outcome of one document enrichment
pub fn record_enrichment(kind: &str, outcome: &str) {
    counter!(
        format!("{}_enrichments_total", METRICS_PREFIX),
        "kind" => kind.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets_sorted_and_cover_timeout_cap() {
        for buckets in [LATENCY_BUCKETS, GENERATION_BUCKETS] {
            let mut prev = 0.0;
            for &bucket in buckets {
                assert!(bucket > prev);
                prev = bucket;
            }
            assert_eq!(buckets.last(), Some(&120.0));
        }
    }

    #[test]
    fn test_disabled_exporter_installs_nothing() {
        assert!(install_exporter(0).is_ok());
    }

    #[test]
    fn test_request_metrics() {
        let metrics = RequestMetrics::start("POST", "/");
        metrics.finish(200);
        record_enrichment("ingredient", "updated");
    }
}
