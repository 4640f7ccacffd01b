//! Provider adapters.
//!
//! A [`Provider`] wraps one vendor API behind the Standard Model. Adapters
//! are used as `Arc<dyn Provider>` trait objects by the registry, so new
//! vendors only need to implement the trait.

pub mod gemini;
pub mod openai;

use crate::core::config::AppConfig;
use crate::core::error::{ProviderError, UpstreamFailure};
use crate::core::metrics::get_metrics;
use crate::transformer::sse::{SseDecoder, DONE_MARKER};
use crate::transformer::{GenerateRequest, GenerateResponse, ProviderCapabilities, ProviderInfo};
use anyhow::Context;
use async_stream::try_stream;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::future::Future;
use std::time::{Duration, Instant};

pub use gemini::GeminiProvider;
pub use openai::OpenAIProvider;

/// Stream of content fragments produced by `stream_generate`.
///
/// Lazy, finite and not restartable. Dropping it releases the upstream
/// connection.
pub type ByteStream = BoxStream<'static, Result<Bytes, ProviderError>>;

/// Default bound on a vendor call when none is configured.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Create the HTTP client shared by all adapters.
///
/// No whole-request timeout is set on the client: it would also cover the
/// body of a streamed completion. Adapters bound set-up and non-streaming
/// reads per call instead.
pub fn create_http_client(config: &AppConfig) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .danger_accept_invalid_certs(!config.verify_ssl)
        .connect_timeout(CONNECT_TIMEOUT.min(config.request_timeout()))
        .pool_max_idle_per_host(100)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .build()
        .context("Failed to build HTTP client")
}

#[async_trait]
pub trait Provider: Send + Sync {
    /// Registry key, e.g. `openai`.
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, ProviderError>;

    /// Open a streaming completion. Each item is the text of one delta.
    async fn stream_generate(&self, request: &GenerateRequest) -> Result<ByteStream, ProviderError>;

    fn capabilities(&self) -> ProviderCapabilities;

    fn info(&self) -> ProviderInfo;

    /// Release resources. Calling it again is a no-op.
    async fn close(&self) -> Result<(), ProviderError>;
}

/// Send a vendor request, bounded by `timeout`, and reject non-2xx replies.
pub(crate) async fn send_checked(
    provider: &str,
    operation: &'static str,
    request: reqwest::RequestBuilder,
    timeout: Duration,
) -> Result<reqwest::Response, ProviderError> {
    let response = with_timeout(timeout, request.send())
        .await
        .map_err(|failure| ProviderError::upstream(provider, operation, failure))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::upstream(
        provider,
        operation,
        UpstreamFailure::Status {
            status: status.as_u16(),
            message: extract_error_message(&body),
        },
    ))
}

/// Read the full body of a successful response, bounded by `timeout`.
pub(crate) async fn read_body(
    provider: &str,
    operation: &'static str,
    response: reqwest::Response,
    timeout: Duration,
) -> Result<Bytes, ProviderError> {
    with_timeout(timeout, response.bytes())
        .await
        .map_err(|failure| ProviderError::upstream(provider, operation, failure))
}

async fn with_timeout<T, F>(timeout: Duration, fut: F) -> Result<T, UpstreamFailure>
where
    F: Future<Output = Result<T, reqwest::Error>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result.map_err(UpstreamFailure::from),
        Err(_) => Err(UpstreamFailure::Timeout(timeout)),
    }
}

/// Pull `error.message` out of a vendor error body, falling back to the raw text.
pub(crate) fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.len() > 512 {
                let mut end = 512;
                while !trimmed.is_char_boundary(end) {
                    end -= 1;
                }
                format!("{}...", &trimmed[..end])
            } else {
                trimmed.to_string()
            }
        })
}

/// Turn a vendor SSE response into a stream of delta text fragments.
///
/// `delta_text` extracts the text of one event payload; empty deltas are
/// skipped. The stream ends on `[DONE]` or when the vendor closes the body.
pub(crate) fn sse_text_stream(
    provider: &'static str,
    response: reqwest::Response,
    delta_text: fn(&str) -> Result<String, UpstreamFailure>,
) -> ByteStream {
    let stream = try_stream! {
        let mut bytes = response.bytes_stream();
        let mut decoder = SseDecoder::new();

        'read: while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(|e| ProviderError::stream(provider, e))?;

            for data in decoder.push(&chunk) {
                if data == DONE_MARKER {
                    break 'read;
                }
                let text = delta_text(&data).map_err(|e| ProviderError::stream(provider, e))?;
                if !text.is_empty() {
                    yield Bytes::from(text);
                }
            }
        }

        for data in decoder.finish() {
            if data == DONE_MARKER {
                break;
            }
            let text = delta_text(&data).map_err(|e| ProviderError::stream(provider, e))?;
            if !text.is_empty() {
                yield Bytes::from(text);
            }
        }
    };

    Box::pin(stream)
}

/// Record latency and, on failure, the error kind for one upstream call.
pub(crate) fn observe<T>(
    provider: &str,
    operation: &str,
    started: Instant,
    result: &Result<T, ProviderError>,
) {
    let metrics = get_metrics();
    metrics
        .provider_latency
        .with_label_values(&[provider, operation])
        .observe(started.elapsed().as_secs_f64());

    if let Err(err) = result {
        metrics
            .provider_errors
            .with_label_values(&[provider, operation, err.kind()])
            .inc();
        tracing::warn!(provider, operation, error = %err, "Upstream call failed");
    }
}

/// Normalize a configured base URL, falling back to `default` when empty.
pub(crate) fn normalize_base_url(url: &str, default: &str) -> String {
    let url = url.trim();
    let url = if url.is_empty() { default } else { url };
    url.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_error_message_from_json() {
        let body = r#"{"error":{"message":"Invalid API key","type":"invalid_request_error"}}"#;
        assert_eq!(extract_error_message(body), "Invalid API key");
    }

    #[test]
    fn test_extract_error_message_falls_back_to_text() {
        assert_eq!(extract_error_message("  Bad Gateway \n"), "Bad Gateway");

        let long = "é".repeat(400);
        let msg = extract_error_message(&long);
        assert!(msg.ends_with("..."));
        assert!(msg.len() <= 515);
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(normalize_base_url("", "https://a.example/v1"), "https://a.example/v1");
        assert_eq!(normalize_base_url("http://localhost:9/v1/", "x"), "http://localhost:9/v1");
    }
}
