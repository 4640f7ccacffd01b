//! Prometheus metrics for monitoring the gateway.
//!
//! This module provides a centralized metrics registry for tracking requests,
//! upstream latency and errors, and streaming relay activity.

use prometheus::{
    register_gauge_vec, register_histogram_vec, register_int_counter_vec, Encoder, GaugeVec,
    HistogramVec, IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;

/// Container for all application metrics.
pub struct Metrics {
    /// Total number of requests by method, endpoint, model, provider, and status
    pub request_count: IntCounterVec,

    /// Request duration histogram in seconds
    pub request_duration: HistogramVec,

    /// Number of currently active requests by endpoint
    pub active_requests: GaugeVec,

    /// Upstream call latency by provider and operation
    pub provider_latency: HistogramVec,

    /// Failed upstream calls by provider, operation and error kind
    pub provider_errors: IntCounterVec,

    /// Non-terminal chunks emitted by the relay, by provider
    pub relay_chunks: IntCounterVec,

    /// Relay terminations by provider and outcome
    pub relay_outcomes: IntCounterVec,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Initialize the metrics registry.
///
/// This should be called once at application startup. Subsequent calls will
/// return the same instance.
pub fn init_metrics() -> &'static Metrics {
    METRICS.get_or_init(|| {
        let request_count = register_int_counter_vec!(
            "letllm_requests_total",
            "Total number of requests",
            &["method", "endpoint", "model", "provider", "status_code"]
        )
        .expect("Failed to register request_count metric");

        let request_duration = register_histogram_vec!(
            "letllm_request_duration_seconds",
            "Request duration in seconds",
            &["method", "endpoint", "model", "provider"],
            vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]
        )
        .expect("Failed to register request_duration metric");

        let active_requests = register_gauge_vec!(
            "letllm_active_requests",
            "Number of active requests",
            &["endpoint"]
        )
        .expect("Failed to register active_requests metric");

        let provider_latency = register_histogram_vec!(
            "letllm_provider_latency_seconds",
            "Upstream provider latency in seconds",
            &["provider", "operation"],
            vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]
        )
        .expect("Failed to register provider_latency metric");

        let provider_errors = register_int_counter_vec!(
            "letllm_provider_errors_total",
            "Failed upstream provider calls",
            &["provider", "operation", "kind"]
        )
        .expect("Failed to register provider_errors metric");

        let relay_chunks = register_int_counter_vec!(
            "letllm_relay_chunks_total",
            "Stream chunks relayed to clients",
            &["provider"]
        )
        .expect("Failed to register relay_chunks metric");

        let relay_outcomes = register_int_counter_vec!(
            "letllm_relay_outcomes_total",
            "Streaming relay terminations by outcome",
            &["provider", "outcome"]
        )
        .expect("Failed to register relay_outcomes metric");

        Metrics {
            request_count,
            request_duration,
            active_requests,
            provider_latency,
            provider_errors,
            relay_chunks,
            relay_outcomes,
        }
    })
}

/// Get the global metrics instance, initializing it on first use.
pub fn get_metrics() -> &'static Metrics {
    init_metrics()
}

/// Render every registered metric in the Prometheus text format.
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
