//! HTTP request handlers for the gateway API.
//!
//! This module contains all endpoint handlers including chat completions,
//! provider and model listings, health checks, and metrics.

use crate::api::models::*;
use crate::api::streaming::{chunk_body, sse_response};
use crate::core::config::AppConfig;
use crate::core::logging::{chat_span, generate_request_id};
use crate::core::metrics::{get_metrics, render_metrics};
use crate::core::{AppError, ModelName, ProviderName, Result, StreamCancelHandle};
use crate::services::{ChunkTemplate, ProviderRegistry, RelayConfig, RelayOutcome, StreamRelay};
use crate::transformer::{validate, GenerateRequest};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::Instrument;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ProviderRegistry>,
    pub relay: StreamRelay,
}

impl AppState {
    pub fn new(registry: Arc<ProviderRegistry>, relay: StreamRelay) -> Self {
        Self { registry, relay }
    }

    pub fn from_config(config: &AppConfig, registry: Arc<ProviderRegistry>) -> Self {
        Self::new(
            registry,
            StreamRelay::new(RelayConfig {
                buffer_size: config.relay_buffer_size,
            }),
        )
    }
}

/// Handle chat completion requests.
///
/// Supports both streaming and non-streaming responses. Validation and
/// routing happen before any upstream call.
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<ChatCompletionRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(payload) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;

    if payload.model.trim().is_empty() {
        return Err(AppError::BadRequest("model is required".to_string()));
    }

    let request = GenerateRequest::from(payload);
    validate(&request)?;

    let provider = state.registry.route(&request.model)?;
    let provider_name = provider.name().to_string();
    let request_id = generate_request_id();
    let span = chat_span(&request_id, &request.model, &provider_name, request.stream);

    async move {
        tracing::debug!("Processing chat completion request");

        let mut response = if request.stream {
            if !provider.capabilities().supports_streaming {
                return Err(AppError::BadRequest(format!(
                    "provider {} does not support streaming",
                    provider_name
                )));
            }

            let upstream = provider.stream_generate(&request).await?;
            let template = ChunkTemplate::new(request.model.clone());
            let cancel = StreamCancelHandle::new();
            let (tx, rx) = mpsc::channel(state.relay.buffer_size().max(1));

            let relay = state.relay.clone();
            let relay_cancel = cancel.clone();
            let label = provider_name.clone();
            tokio::spawn(
                async move {
                    let outcome = relay.run(upstream, template, relay_cancel, tx).await;
                    record_relay_outcome(&label, &outcome);
                }
                .in_current_span(),
            );

            sse_response(chunk_body(rx, cancel))
        } else {
            let generated = provider.generate(&request).await?;
            Json(ChatCompletionResponse::from(generated.response)).into_response()
        };

        response.extensions_mut().insert(ModelName(request.model.clone()));
        response.extensions_mut().insert(ProviderName(provider_name));
        Ok(response)
    }
    .instrument(span)
    .await
}

fn record_relay_outcome(provider: &str, outcome: &RelayOutcome) {
    let metrics = get_metrics();
    metrics
        .relay_chunks
        .with_label_values(&[provider])
        .inc_by(outcome.chunks() as u64);
    metrics
        .relay_outcomes
        .with_label_values(&[provider, outcome.label()])
        .inc();

    match outcome {
        RelayOutcome::Completed { chunks } => {
            tracing::debug!(chunks, "Stream completed");
        }
        RelayOutcome::Cancelled { chunks } => {
            tracing::info!(chunks, "Stream cancelled by client");
        }
        RelayOutcome::Failed { chunks, error } => {
            tracing::error!(chunks, error = %error, "Stream failed mid-response");
        }
    }
}

/// List registered providers.
pub async fn list_providers(State(state): State<Arc<AppState>>) -> Json<ProviderList> {
    Json(ProviderList {
        object: "list".to_string(),
        data: state.registry.list(),
    })
}

/// List models served by the registered providers.
pub async fn list_models(State(state): State<Arc<AppState>>) -> Json<ModelList> {
    Json(ModelList::from_providers(&state.registry.list()))
}

/// Health check endpoint.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        providers: state.registry.len(),
    })
}

/// Prometheus metrics endpoint.
pub async fn metrics_handler() -> Result<Response> {
    let body = render_metrics().map_err(|e| AppError::Internal(e.to_string()))?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}
