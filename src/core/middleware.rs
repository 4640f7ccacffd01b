//! HTTP middleware for request tracking and metrics.

use crate::core::metrics::get_metrics;
use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

/// Extension type for storing model name in response
#[derive(Clone, Debug)]
pub struct ModelName(pub String);

/// Extension type for storing provider name in response
#[derive(Clone, Debug)]
pub struct ProviderName(pub String);

/// Middleware for tracking request metrics.
pub struct MetricsMiddleware;

impl MetricsMiddleware {
    /// Track metrics for incoming requests.
    ///
    /// Handlers attach [`ModelName`] and [`ProviderName`] extensions to the
    /// response; requests without a provider (health, listings) are counted
    /// as active but not recorded per model.
    pub async fn track_metrics(request: Request, next: Next) -> Response {
        let endpoint = request.uri().path().to_string();
        let method = request.method().to_string();

        // Skip metrics endpoint itself to avoid recursion
        if endpoint == "/metrics" {
            return next.run(request).await;
        }

        let metrics = get_metrics();
        let active = metrics.active_requests.with_label_values(&[&endpoint]);
        active.inc();

        let start = Instant::now();
        let response = next.run(request).await;
        let duration = start.elapsed().as_secs_f64();

        active.dec();

        let status_code = response.status().as_u16().to_string();
        let model = response
            .extensions()
            .get::<ModelName>()
            .map(|m| m.0.as_str())
            .unwrap_or("unknown");
        let provider = response
            .extensions()
            .get::<ProviderName>()
            .map(|p| p.0.as_str())
            .unwrap_or("unknown");

        if provider != "unknown" {
            metrics
                .request_count
                .with_label_values(&[&method, &endpoint, model, provider, &status_code])
                .inc();
            metrics
                .request_duration
                .with_label_values(&[&method, &endpoint, model, provider])
                .observe(duration);

            let is_streaming = response
                .headers()
                .get(axum::http::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(|ct| ct.contains("text/event-stream"))
                .unwrap_or(false);

            // For streaming responses this is time to first byte, not body completion
            let label = if is_streaming { "ttfb" } else { "duration" };
            tracing::info!(
                "{} {} - status={} model={} provider={} {}={:.3}s",
                method,
                endpoint,
                status_code,
                model,
                provider,
                label,
                duration
            );
        } else {
            tracing::debug!("{} {} - status={}", method, endpoint, status_code);
        }

        response
    }
}
