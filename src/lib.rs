//! letllm - a vendor-neutral gateway for chat-completion LLM APIs
//!
//! This library exposes one OpenAI-style chat completion API and forwards each
//! request to an upstream vendor, normalizing requests and responses
//! (including token-streamed output) into a single shape:
//!
//! - **Standard Model**: vendor-neutral request, response and chunk types with validation
//! - **Provider Adapters**: OpenAI and Google Gemini behind one `Provider` trait
//! - **Routing**: prefix rules from configuration, then a model-name heuristic
//! - **Streaming Relay**: reader/sender task pair with backpressure and cancellation
//! - **Metrics & Monitoring**: Prometheus metrics for observability
//!
//! # Architecture
//!
//! - [`core`]: Core functionality (config, errors, logging, metrics, middleware)
//! - [`transformer`]: Standard Model and vendor wire conversions
//! - [`providers`]: Vendor adapters
//! - [`services`]: Provider registry and streaming relay
//! - [`api`]: HTTP handlers and wire models
//!
//! # Configuration
//!
//! Configuration is read from a YAML file (first CLI argument, `CONFIG_PATH`,
//! or `config.yaml`). Environment variables take precedence:
//! - `OPENAI_API_KEY`, `GEMINI_API_KEY`: enable the matching provider
//! - `HOST`: Server bind address (default: 0.0.0.0)
//! - `PORT`: Server port (default: 8080)
//! - `VERIFY_SSL`: Verify SSL certificates for upstream (default: true)
//! - `REQUEST_TIMEOUT_SECS`: Upstream request timeout in seconds (default: 300)

pub mod api;
pub mod core;
pub mod providers;
pub mod services;
pub mod transformer;

// Re-export commonly used types for convenience
pub use api::{build_router, AppState, ChatCompletionRequest, ChatCompletionResponse};
pub use core::{AppConfig, AppError, ProviderError, Result, RoutingError, ValidationError};
pub use providers::{GeminiProvider, OpenAIProvider, Provider};
pub use services::{ProviderRegistry, StreamRelay};
