//! OpenAI Chat Completions wire format.
//!
//! Handles conversion between the OpenAI request/response bodies and the
//! Standard Model. The HTTP side lives in `providers::openai`.

use super::standard::{
    Choice, FinishReason, FunctionCall, GenerateRequest, GenerateResponse, Message,
    ProviderCapabilities, StandardResponse, Usage,
};
use crate::core::error::UpstreamFailure;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// OpenAI Request/Response Types
// ============================================================================

/// OpenAI message format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<OpenAIFunctionCall>,
}

/// OpenAI function call structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIFunctionCall {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

/// OpenAI function definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIFunction {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: Value,
}

/// OpenAI chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIChatRequest {
    pub model: String,
    pub messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<OpenAIFunction>,
}

/// OpenAI usage block.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct OpenAIUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// OpenAI response choice.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIChoice {
    #[serde(default)]
    pub index: u32,
    pub message: OpenAIMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// OpenAI chat completion response.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIChatResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<OpenAIChoice>,
    #[serde(default)]
    pub usage: Option<OpenAIUsage>,
    #[serde(default)]
    pub system_fingerprint: Option<String>,
}

/// Delta carried by a streaming choice.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAIDelta {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIStreamChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: OpenAIDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// One `data:` payload of an OpenAI stream.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIStreamChunk {
    #[serde(default)]
    pub choices: Vec<OpenAIStreamChoice>,
}

// ============================================================================
// Conversions
// ============================================================================

/// Map an OpenAI finish reason. Unknown values yield `None`.
pub fn map_finish_reason(reason: &str) -> Option<FinishReason> {
    match reason {
        "stop" => Some(FinishReason::Stop),
        "length" => Some(FinishReason::Length),
        "function_call" | "tool_calls" => Some(FinishReason::FunctionCall),
        "content_filter" => Some(FinishReason::ContentFilter),
        _ => None,
    }
}

/// Build the vendor request body.
///
/// Function definitions are sent only when `capabilities` allows them.
/// `provider_specific` keys fill in anything the mapping did not set.
pub fn build_request(
    request: &GenerateRequest,
    capabilities: &ProviderCapabilities,
    stream: bool,
) -> Result<Value, serde_json::Error> {
    let messages = request
        .messages
        .iter()
        .map(|msg| OpenAIMessage {
            role: msg.role.clone(),
            content: (!msg.content.is_empty() || msg.function_call.is_none())
                .then(|| msg.content.clone()),
            name: msg.name.clone(),
            function_call: msg.function_call.as_ref().map(|fc| OpenAIFunctionCall {
                name: fc.name.clone(),
                arguments: fc.arguments.clone(),
            }),
        })
        .collect();

    let functions = if capabilities.supports_functions {
        request
            .functions
            .iter()
            .map(|f| OpenAIFunction {
                name: f.name.clone(),
                description: (!f.description.is_empty()).then(|| f.description.clone()),
                parameters: f.parameters.clone(),
            })
            .collect()
    } else {
        Vec::new()
    };

    let body = OpenAIChatRequest {
        model: request.model.clone(),
        messages,
        temperature: request.temperature.map(|t| t as f32),
        top_p: request.top_p.map(|p| p as f32),
        max_tokens: request.max_tokens.map(saturating_u32),
        stream,
        functions,
    };

    let mut value = serde_json::to_value(body)?;
    merge_provider_specific(&mut value, &request.provider_specific);
    Ok(value)
}

/// Convert a vendor response body into the Standard Model.
///
/// `system_fingerprint` is kept in `provider_specific`.
pub fn parse_response(body: &[u8], requested_model: &str) -> Result<GenerateResponse, UpstreamFailure> {
    let resp: OpenAIChatResponse = serde_json::from_slice(body)?;

    if resp.choices.is_empty() {
        return Err(UpstreamFailure::Protocol("response contained no choices".into()));
    }

    let choices = resp
        .choices
        .into_iter()
        .map(|c| {
            let mut message = Message::assistant(c.message.content.unwrap_or_default());
            message.function_call = c.message.function_call.map(|fc| FunctionCall {
                name: fc.name,
                arguments: fc.arguments,
            });
            Choice::message(c.index, message, c.finish_reason.as_deref().and_then(map_finish_reason))
        })
        .collect();

    let usage = resp
        .usage
        .map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        })
        .unwrap_or_default();

    let model = if resp.model.is_empty() {
        requested_model.to_string()
    } else {
        resp.model
    };

    let mut standard = StandardResponse::new(resp.id, model, choices, usage);
    if resp.created > 0 {
        standard.created = resp.created;
    }

    let mut response = GenerateResponse::from(standard);
    if let Some(fingerprint) = resp.system_fingerprint.filter(|f| !f.is_empty()) {
        response
            .provider_specific
            .insert("system_fingerprint".into(), Value::String(fingerprint));
    }
    Ok(response)
}

/// Text carried by one stream payload, concatenated across choices.
pub fn delta_text(data: &str) -> Result<String, UpstreamFailure> {
    let chunk: OpenAIStreamChunk = serde_json::from_str(data)?;
    Ok(chunk
        .choices
        .into_iter()
        .filter_map(|c| c.delta.content)
        .collect())
}

pub(crate) fn saturating_u32(n: i64) -> u32 {
    u32::try_from(n.max(0)).unwrap_or(u32::MAX)
}

pub(crate) fn merge_provider_specific(body: &mut Value, extra: &Map<String, Value>) {
    if let Value::Object(obj) = body {
        for (key, value) in extra {
            obj.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }
}
