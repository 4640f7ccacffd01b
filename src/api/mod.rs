//! API layer for the gateway server.
//!
//! This module contains all HTTP handlers, request/response models,
//! and streaming support for the API endpoints.

pub mod disconnect;
pub mod handlers;
pub mod models;
pub mod streaming;

use crate::core::MetricsMiddleware;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

// Re-export commonly used types
pub use handlers::{
    chat_completions, health, list_models, list_providers, metrics_handler, AppState,
};
pub use models::{ChatCompletionRequest, ChatCompletionResponse, HealthResponse, ModelList};
pub use streaming::{chunk_body, encode_frame, sse_response, DONE_FRAME};

/// Build the router with all endpoints.
///
/// Request metrics cover the `/v1` routes only.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/providers", get(list_providers))
        .route("/v1/models", get(list_models))
        .route_layer(axum::middleware::from_fn(MetricsMiddleware::track_metrics))
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
