//! Core functionality for the gateway.
//!
//! This module contains fundamental components used throughout the application:
//! - Configuration management
//! - Error taxonomy
//! - Logging and metrics
//! - Stream cancellation
//! - HTTP middleware

pub mod cancel;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod middleware;

// Re-export commonly used types
pub use cancel::StreamCancelHandle;
pub use config::{AppConfig, RouteRule, ServerConfig, VendorConfig};
pub use error::{AppError, ProviderError, Result, RoutingError, UpstreamFailure, ValidationError};
pub use logging::{generate_request_id, init_tracing};
pub use metrics::{get_metrics, init_metrics, Metrics};
pub use middleware::{MetricsMiddleware, ModelName, ProviderName};
