//! Error types and handling for the gateway.
//!
//! The core reports four families of failure:
//!
//! - [`ValidationError`]: malformed or out-of-range request, raised before any upstream call
//! - [`RoutingError`]: no adapter can serve the requested model
//! - [`ProviderError`]: an adapter call (or its stream) failed
//! - [`AppError`]: the HTTP-facing wrapper that renders all of the above as JSON

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub const ERROR_TYPE_INVALID_REQUEST: &str = "invalid_request_error";
pub const ERROR_TYPE_API: &str = "api_error";
pub const ERROR_TYPE_UPSTREAM: &str = "upstream_error";
pub const ERROR_TYPE_TIMEOUT: &str = "timeout_error";

/// A request violated a Standard Model invariant.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("model is required")]
    MissingModel,

    #[error("at least one message is required")]
    EmptyMessages,

    #[error("message {index}: role is required")]
    MissingRole { index: usize },

    #[error("message {index}: invalid role '{role}'")]
    InvalidRole { index: usize, role: String },

    #[error("message {index}: content or function_call is required")]
    MissingContent { index: usize },

    #[error("temperature must be between 0 and 2, got {0}")]
    TemperatureOutOfRange(f64),

    #[error("top_p must be between 0 and 1, got {0}")]
    TopPOutOfRange(f64),

    #[error("max_tokens must be positive, got {0}")]
    InvalidMaxTokens(i64),
}

/// The registry could not resolve a model to an adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoutingError {
    #[error("no provider matched model {0:?}")]
    NoProviderForModel(String),

    #[error("provider {provider} not configured (routed from model {model:?})")]
    ProviderNotConfigured { provider: String, model: String },

    #[error("provider {0} cannot be registered without an adapter")]
    NilProvider(String),
}

/// Underlying cause of a failed vendor interaction.
#[derive(Error, Debug)]
pub enum UpstreamFailure {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("vendor returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("malformed vendor payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0}")]
    Protocol(String),

    #[error("no response within {0:?}")]
    Timeout(std::time::Duration),
}

impl UpstreamFailure {
    pub fn is_timeout(&self) -> bool {
        match self {
            UpstreamFailure::Timeout(_) => true,
            UpstreamFailure::Transport(e) => e.is_timeout(),
            _ => false,
        }
    }
}

/// A provider adapter call failed.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] ValidationError),

    #[error("{provider} {operation} failed: {source}")]
    Upstream {
        provider: String,
        operation: &'static str,
        #[source]
        source: UpstreamFailure,
    },

    #[error("{provider} stream read failed: {source}")]
    Stream {
        provider: String,
        #[source]
        source: UpstreamFailure,
    },

    #[error("provider {0} is closed")]
    Closed(String),
}

impl ProviderError {
    pub fn upstream(provider: impl Into<String>, operation: &'static str, source: impl Into<UpstreamFailure>) -> Self {
        ProviderError::Upstream {
            provider: provider.into(),
            operation,
            source: source.into(),
        }
    }

    pub fn stream(provider: impl Into<String>, source: impl Into<UpstreamFailure>) -> Self {
        ProviderError::Stream {
            provider: provider.into(),
            source: source.into(),
        }
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::InvalidRequest(_) => "invalid_request",
            ProviderError::Upstream { .. } => "upstream",
            ProviderError::Stream { .. } => "stream",
            ProviderError::Closed(_) => "closed",
        }
    }
}

/// Main error type for the HTTP surface.
///
/// All errors reaching a handler are converted to this type for consistent rendering.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors (file not found, parse errors, etc.)
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Client provided invalid data
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Generic internal server errors with custom message
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_and_type(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Config(_) | AppError::Serialization(_) | AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, ERROR_TYPE_API)
            }
            AppError::Validation(_) | AppError::BadRequest(_) => {
                (StatusCode::BAD_REQUEST, ERROR_TYPE_INVALID_REQUEST)
            }
            AppError::Routing(RoutingError::NilProvider(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, ERROR_TYPE_API)
            }
            AppError::Routing(_) => (StatusCode::BAD_REQUEST, ERROR_TYPE_INVALID_REQUEST),
            AppError::Provider(ProviderError::InvalidRequest(_)) => {
                (StatusCode::BAD_REQUEST, ERROR_TYPE_INVALID_REQUEST)
            }
            AppError::Provider(ProviderError::Upstream { source, .. })
            | AppError::Provider(ProviderError::Stream { source, .. }) => {
                if source.is_timeout() {
                    (StatusCode::GATEWAY_TIMEOUT, ERROR_TYPE_TIMEOUT)
                } else {
                    (StatusCode::BAD_GATEWAY, ERROR_TYPE_UPSTREAM)
                }
            }
            AppError::Provider(ProviderError::Closed(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, ERROR_TYPE_API)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status_and_type();

        if status.is_server_error() {
            tracing::error!(error = ?self, "Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }

        let body = Json(json!({
            "error": {
                "message": self.to_string(),
                "type": error_type,
                "code": status.as_u16()
            }
        }));

        (status, body).into_response()
    }
}

/// Convenience type alias for Results using [`AppError`].
pub type Result<T> = std::result::Result<T, AppError>;
