//! OpenAI Chat Completions adapter.

use super::{
    normalize_base_url, observe, read_body, send_checked, sse_text_stream, ByteStream, Provider,
    DEFAULT_REQUEST_TIMEOUT,
};
use crate::core::config::VendorConfig;
use crate::core::error::ProviderError;
use crate::transformer::openai::{build_request, delta_text, parse_response};
use crate::transformer::{
    validate, GenerateRequest, GenerateResponse, ProviderCapabilities, ProviderInfo,
};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

pub const PROVIDER_NAME: &str = "openai";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

pub struct OpenAIProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    default_model: String,
    capabilities: ProviderCapabilities,
    request_timeout: Duration,
    closed: AtomicBool,
}

impl OpenAIProvider {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            capabilities: Self::default_capabilities().with_model(DEFAULT_MODEL),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            closed: AtomicBool::new(false),
        }
    }

    pub fn from_config(client: reqwest::Client, config: &VendorConfig, request_timeout: Duration) -> Self {
        Self::new(client, config.api_key.clone())
            .with_base_url(&config.base_url)
            .with_default_model(&config.default_model)
            .with_request_timeout(request_timeout)
    }

    /// An empty URL keeps the public endpoint.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = normalize_base_url(base_url, DEFAULT_BASE_URL);
        self
    }

    /// An empty name keeps the current default.
    pub fn with_default_model(mut self, model: &str) -> Self {
        if !model.is_empty() {
            self.default_model = model.to_string();
            self.capabilities = self.capabilities.with_model(model);
        }
        self
    }

    pub fn with_capabilities(mut self, capabilities: ProviderCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn default_capabilities() -> ProviderCapabilities {
        ProviderCapabilities {
            supports_streaming: true,
            supports_functions: true,
            supports_system_role: true,
            max_tokens: 4096,
            max_context_length: 128_000,
            supported_models: ["gpt-4", "gpt-4-turbo", "gpt-4o", "gpt-4o-mini", "gpt-3.5-turbo"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            supported_parameters: ["temperature", "top_p", "max_tokens", "stream", "functions"]
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn check_request(&self, request: &GenerateRequest) -> Result<(), ProviderError> {
        validate(request)?;
        if self.closed.load(Ordering::Acquire) {
            return Err(ProviderError::Closed(PROVIDER_NAME.to_string()));
        }
        Ok(())
    }

    async fn post(
        &self,
        request: &GenerateRequest,
        stream: bool,
        operation: &'static str,
    ) -> Result<reqwest::Response, ProviderError> {
        let body = build_request(request, &self.capabilities, stream)
            .map_err(|e| ProviderError::upstream(PROVIDER_NAME, operation, e))?;

        tracing::debug!(
            provider = PROVIDER_NAME,
            model = %request.model,
            stream,
            url = %self.endpoint(),
            "Sending chat completion request"
        );

        let builder = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body);

        send_checked(PROVIDER_NAME, operation, builder, self.request_timeout).await
    }
}

#[async_trait]
impl Provider for OpenAIProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, ProviderError> {
        self.check_request(request)?;

        let started = Instant::now();
        let result = async {
            let response = self.post(request, false, "generate").await?;
            let body = read_body(PROVIDER_NAME, "generate", response, self.request_timeout).await?;
            parse_response(&body, &request.model)
                .map_err(|e| ProviderError::upstream(PROVIDER_NAME, "generate", e))
        }
        .await;

        observe(PROVIDER_NAME, "generate", started, &result);
        result
    }

    async fn stream_generate(&self, request: &GenerateRequest) -> Result<ByteStream, ProviderError> {
        self.check_request(request)?;

        let started = Instant::now();
        let result = self
            .post(request, true, "stream_generate")
            .await
            .map(|response| sse_text_stream(PROVIDER_NAME, response, delta_text));

        observe(PROVIDER_NAME, "stream_generate", started, &result);
        result
    }

    fn capabilities(&self) -> ProviderCapabilities {
        self.capabilities.clone()
    }

    fn info(&self) -> ProviderInfo {
        let status = if self.closed.load(Ordering::Acquire) {
            "closed"
        } else {
            "active"
        };
        ProviderInfo {
            name: PROVIDER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            capabilities: self.capabilities.clone(),
            status: status.to_string(),
            last_updated: Utc::now(),
        }
    }

    async fn close(&self) -> Result<(), ProviderError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::info!(provider = PROVIDER_NAME, "Provider closed");
        }
        Ok(())
    }
}
