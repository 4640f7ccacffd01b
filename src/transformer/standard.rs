//! Standard (vendor-neutral) model for chat completions.
//!
//! Every provider adapter converts to and from these types. Requests are
//! validated with [`validate`] before any upstream call is made, and the
//! capability descriptors of several adapters can be folded into one with
//! [`merge_capabilities`] for introspection.

use crate::core::error::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Object tag for non-streaming responses.
pub const OBJECT_CHAT_COMPLETION: &str = "chat.completion";

/// Object tag for streaming chunks.
pub const OBJECT_CHAT_COMPLETION_CHUNK: &str = "chat.completion.chunk";

// ============================================================================
// Roles
// ============================================================================

/// Message role.
///
/// [`Message::role`] stays a plain string so malformed input survives
/// deserialization and is reported by [`validate`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Function,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Function => "function",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "function" => Ok(Role::Function),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

// ============================================================================
// Finish Reasons
// ============================================================================

/// Shared finish-reason vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    FunctionCall,
    ContentFilter,
}

impl FinishReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::FunctionCall => "function_call",
            FinishReason::ContentFilter => "content_filter",
        }
    }
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Messages
// ============================================================================

/// A function invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded argument object, exactly as the vendor produced it.
    #[serde(default)]
    pub arguments: String,
}

/// A function the model may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Value,
}

/// One chat message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role: role.as_str().to_string(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// A `function` role message carrying the result of a call to `name`.
    pub fn function(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::new(Role::Function, content)
        }
    }

    pub fn with_function_call(mut self, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        self.function_call = Some(FunctionCall {
            name: name.into(),
            arguments: arguments.into(),
        });
        self
    }

    /// Parsed role, `None` when the string is not a known role.
    pub fn parsed_role(&self) -> Option<Role> {
        self.role.parse().ok()
    }
}

// ============================================================================
// Requests
// ============================================================================

/// Vendor-neutral chat completion request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StandardRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<FunctionDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl StandardRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            ..Default::default()
        }
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: i64) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn with_functions(mut self, functions: Vec<FunctionDefinition>) -> Self {
        self.functions = functions;
        self
    }
}

/// A request handed to a provider adapter.
///
/// `provider_specific` keys are merged into the vendor body for any key the
/// adapter has not set itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    #[serde(flatten)]
    pub request: StandardRequest,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub provider_specific: Map<String, Value>,
}

impl From<StandardRequest> for GenerateRequest {
    fn from(request: StandardRequest) -> Self {
        Self {
            request,
            provider_specific: Map::new(),
        }
    }
}

impl std::ops::Deref for GenerateRequest {
    type Target = StandardRequest;

    fn deref(&self) -> &Self::Target {
        &self.request
    }
}

// ============================================================================
// Responses
// ============================================================================

/// Token counts reported by the vendor. Zero when the vendor reports nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One completion choice. Exactly one of `message` / `delta` is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

impl Choice {
    pub fn message(index: u32, message: Message, finish_reason: Option<FinishReason>) -> Self {
        Self {
            index,
            message: Some(message),
            delta: None,
            finish_reason,
        }
    }

    pub fn delta(index: u32, delta: Message, finish_reason: Option<FinishReason>) -> Self {
        Self {
            index,
            message: None,
            delta: Some(delta),
            finish_reason,
        }
    }
}

/// Vendor-neutral chat completion response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl StandardResponse {
    pub fn new(id: impl Into<String>, model: impl Into<String>, choices: Vec<Choice>, usage: Usage) -> Self {
        Self {
            id: id.into(),
            object: OBJECT_CHAT_COMPLETION.to_string(),
            created: Utc::now().timestamp(),
            model: model.into(),
            choices,
            usage,
            metadata: None,
        }
    }

    /// Text of the first choice, empty when there is none.
    pub fn first_content(&self) -> &str {
        self.choices
            .first()
            .and_then(|c| c.message.as_ref())
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }
}

/// What an adapter returns from `generate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    #[serde(flatten)]
    pub response: StandardResponse,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub provider_specific: Map<String, Value>,
}

impl From<StandardResponse> for GenerateResponse {
    fn from(response: StandardResponse) -> Self {
        Self {
            response,
            provider_specific: Map::new(),
        }
    }
}

// ============================================================================
// Streaming
// ============================================================================

/// Error details attached to a final stream chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(rename = "type")]
    pub error_type: String,
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Map<String, Value>>,
}

/// One incremental unit of a streaming response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

impl StreamChunk {
    pub fn new(id: impl Into<String>, model: impl Into<String>, choices: Vec<Choice>, done: bool) -> Self {
        Self {
            id: id.into(),
            object: OBJECT_CHAT_COMPLETION_CHUNK.to_string(),
            created: Utc::now().timestamp(),
            model: model.into(),
            choices,
            done,
            usage: None,
            error: None,
        }
    }

    /// A single assistant delta carrying `content`.
    pub fn delta(id: impl Into<String>, model: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(
            id,
            model,
            vec![Choice::delta(0, Message::assistant(content), None)],
            false,
        )
    }

    /// The end-of-stream marker.
    pub fn terminal(id: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new(id, model, Vec::new(), true)
    }

    /// Concatenated delta text of all choices.
    pub fn content(&self) -> String {
        self.choices
            .iter()
            .filter_map(|c| c.delta.as_ref())
            .map(|d| d.content.as_str())
            .collect()
    }
}

// ============================================================================
// Capabilities
// ============================================================================

/// Static description of what an adapter supports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    pub supports_streaming: bool,
    pub supports_functions: bool,
    pub supports_system_role: bool,
    pub max_tokens: u32,
    pub max_context_length: u32,
    pub supported_models: Vec<String>,
    pub supported_parameters: Vec<String>,
}

impl ProviderCapabilities {
    /// Add `model` to the supported list unless it is already present or empty.
    pub fn with_model(mut self, model: &str) -> Self {
        if !model.is_empty() && !self.supported_models.iter().any(|m| m == model) {
            self.supported_models.push(model.to_string());
        }
        self
    }
}

/// Read-only snapshot of an adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub name: String,
    pub version: String,
    pub capabilities: ProviderCapabilities,
    pub status: String,
    pub last_updated: DateTime<Utc>,
}

// ============================================================================
// Validation
// ============================================================================

/// Check a request against the Standard Model invariants.
pub fn validate(request: &StandardRequest) -> Result<(), ValidationError> {
    if request.model.is_empty() {
        return Err(ValidationError::MissingModel);
    }

    if request.messages.is_empty() {
        return Err(ValidationError::EmptyMessages);
    }

    for (index, msg) in request.messages.iter().enumerate() {
        if msg.role.is_empty() {
            return Err(ValidationError::MissingRole { index });
        }
        if msg.parsed_role().is_none() {
            return Err(ValidationError::InvalidRole {
                index,
                role: msg.role.clone(),
            });
        }
        if msg.content.is_empty() && msg.function_call.is_none() {
            return Err(ValidationError::MissingContent { index });
        }
    }

    // `contains` is false for NaN, so NaN is rejected as well
    if let Some(t) = request.temperature {
        if !(0.0..=2.0).contains(&t) {
            return Err(ValidationError::TemperatureOutOfRange(t));
        }
    }

    if let Some(p) = request.top_p {
        if !(0.0..=1.0).contains(&p) {
            return Err(ValidationError::TopPOutOfRange(p));
        }
    }

    if let Some(n) = request.max_tokens {
        if n <= 0 {
            return Err(ValidationError::InvalidMaxTokens(n));
        }
    }

    Ok(())
}

/// Fold several capability descriptors into one aggregate.
///
/// Booleans are OR-ed, numeric limits take the maximum and lists are
/// unioned in first-seen order.
pub fn merge_capabilities<'a, I>(capabilities: I) -> ProviderCapabilities
where
    I: IntoIterator<Item = &'a ProviderCapabilities>,
{
    let mut merged = ProviderCapabilities::default();
    let mut seen_models = HashSet::new();
    let mut seen_params = HashSet::new();

    for cap in capabilities {
        merged.supports_streaming |= cap.supports_streaming;
        merged.supports_functions |= cap.supports_functions;
        merged.supports_system_role |= cap.supports_system_role;
        merged.max_tokens = merged.max_tokens.max(cap.max_tokens);
        merged.max_context_length = merged.max_context_length.max(cap.max_context_length);

        for model in &cap.supported_models {
            if seen_models.insert(model.as_str()) {
                merged.supported_models.push(model.clone());
            }
        }
        for param in &cap.supported_parameters {
            if seen_params.insert(param.as_str()) {
                merged.supported_parameters.push(param.clone());
            }
        }
    }

    merged
}
