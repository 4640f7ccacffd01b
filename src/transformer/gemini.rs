//! Gemini `generateContent` wire format.
//!
//! Handles conversion between Google Gemini request/response bodies and the
//! Standard Model. Gemini has no system role, so system messages are folded
//! into the next user turn.

use super::openai::{merge_provider_specific, saturating_u32};
use super::standard::{
    Choice, FinishReason, FunctionCall, GenerateRequest, GenerateResponse, Message,
    ProviderCapabilities, Role, StandardResponse, Usage,
};
use crate::core::error::UpstreamFailure;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

// ============================================================================
// Gemini Request/Response Types
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiContent {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

impl GeminiContent {
    fn text(role: &str, text: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            parts: vec![GeminiPart::text(text)],
        }
    }
}

/// One part of a content turn. Exactly one field is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<GeminiFunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_response: Option<GeminiFunctionResponse>,
}

impl GeminiPart {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiFunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiFunctionResponse {
    pub name: String,
    pub response: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

impl GenerationConfig {
    fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.top_p.is_none() && self.max_output_tokens.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiTool {
    pub function_declarations: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiRequest {
    pub contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<GeminiTool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiCandidate {
    #[serde(default)]
    pub content: Option<GeminiContent>,
    #[serde(default)]
    pub finish_reason: Option<String>,
    #[serde(default)]
    pub index: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiUsage {
    #[serde(default)]
    pub prompt_token_count: u32,
    #[serde(default)]
    pub candidates_token_count: u32,
    #[serde(default)]
    pub total_token_count: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
}

/// Body of a `generateContent` response, and of each streamed event.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiResponse {
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    pub usage_metadata: Option<GeminiUsage>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    pub model_version: Option<String>,
    #[serde(default)]
    pub response_id: Option<String>,
}

// ============================================================================
// Conversions
// ============================================================================

/// Map a Gemini finish reason. Unknown values yield `None`.
pub fn map_finish_reason(reason: &str) -> Option<FinishReason> {
    match reason {
        "STOP" => Some(FinishReason::Stop),
        "MAX_TOKENS" => Some(FinishReason::Length),
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" => {
            Some(FinishReason::ContentFilter)
        }
        _ => None,
    }
}

/// Convert Standard Model messages into Gemini content turns.
///
/// System text accumulates (joined with `\n`) and is prepended to the next
/// user message with a blank line. System text with no user message after it
/// becomes a user turn of its own.
pub fn convert_messages(messages: &[Message]) -> Vec<GeminiContent> {
    let mut contents = Vec::with_capacity(messages.len());
    let mut system = String::new();

    for msg in messages {
        match msg.parsed_role() {
            Some(Role::System) => {
                if !system.is_empty() {
                    system.push('\n');
                }
                system.push_str(&msg.content);
            }
            Some(Role::User) => {
                let text = if system.is_empty() {
                    msg.content.clone()
                } else {
                    format!("{}\n\n{}", std::mem::take(&mut system), msg.content)
                };
                contents.push(GeminiContent::text("user", text));
            }
            Some(Role::Assistant) => {
                let mut parts = Vec::new();
                if !msg.content.is_empty() {
                    parts.push(GeminiPart::text(msg.content.clone()));
                }
                if let Some(fc) = &msg.function_call {
                    parts.push(GeminiPart {
                        function_call: Some(GeminiFunctionCall {
                            name: fc.name.clone(),
                            args: parse_json_object(&fc.arguments),
                        }),
                        ..Default::default()
                    });
                }
                contents.push(GeminiContent {
                    role: "model".to_string(),
                    parts,
                });
            }
            Some(Role::Function) => {
                contents.push(GeminiContent {
                    role: "user".to_string(),
                    parts: vec![GeminiPart {
                        function_response: Some(GeminiFunctionResponse {
                            name: msg.name.clone().unwrap_or_default(),
                            response: parse_json_object(&msg.content),
                        }),
                        ..Default::default()
                    }],
                });
            }
            // Unknown roles never get past validation
            None => {}
        }
    }

    if !system.is_empty() {
        contents.push(GeminiContent::text("user", system));
    }

    contents
}

/// Build the vendor request body.
///
/// Function declarations are sent only when `capabilities` allows them.
pub fn build_request(
    request: &GenerateRequest,
    capabilities: &ProviderCapabilities,
) -> Result<Value, serde_json::Error> {
    let generation_config = GenerationConfig {
        temperature: request.temperature.map(|t| t as f32),
        top_p: request.top_p.map(|p| p as f32),
        max_output_tokens: request.max_tokens.map(saturating_u32),
    };

    let tools = if capabilities.supports_functions && !request.functions.is_empty() {
        vec![GeminiTool {
            function_declarations: request
                .functions
                .iter()
                .map(|f| {
                    let mut decl = json!({ "name": f.name, "parameters": f.parameters });
                    if !f.description.is_empty() {
                        decl["description"] = json!(f.description);
                    }
                    decl
                })
                .collect(),
        }]
    } else {
        Vec::new()
    };

    let body = GeminiRequest {
        contents: convert_messages(&request.messages),
        generation_config: (!generation_config.is_empty()).then_some(generation_config),
        tools,
    };

    let mut value = serde_json::to_value(body)?;
    merge_provider_specific(&mut value, &request.provider_specific);
    Ok(value)
}

/// Convert a `generateContent` response body into the Standard Model.
///
/// A prompt blocked by safety settings yields one empty `content_filter`
/// choice. `modelVersion` is kept in `provider_specific`.
pub fn parse_response(body: &[u8], requested_model: &str) -> Result<GenerateResponse, UpstreamFailure> {
    let resp: GeminiResponse = serde_json::from_slice(body)?;

    let choices = if resp.candidates.is_empty() {
        let blocked = resp
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref());
        match blocked {
            Some(_) => vec![Choice::message(
                0,
                Message::assistant(""),
                Some(FinishReason::ContentFilter),
            )],
            None => {
                return Err(UpstreamFailure::Protocol("no candidates in response".into()));
            }
        }
    } else {
        resp.candidates
            .iter()
            .enumerate()
            .map(|(i, candidate)| convert_candidate(i, candidate))
            .collect()
    };

    let usage = resp
        .usage_metadata
        .map(|u| Usage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
            total_tokens: if u.total_token_count > 0 {
                u.total_token_count
            } else {
                u.prompt_token_count.saturating_add(u.candidates_token_count)
            },
        })
        .unwrap_or_default();

    let id = resp
        .response_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| format!("chatcmpl-{}", uuid::Uuid::new_v4().simple()));

    let mut response = GenerateResponse::from(StandardResponse::new(id, requested_model, choices, usage));
    if let Some(version) = resp.model_version.filter(|v| !v.is_empty()) {
        response
            .provider_specific
            .insert("modelVersion".into(), Value::String(version));
    }
    Ok(response)
}

/// Text carried by one streamed event, concatenated across candidates.
pub fn delta_text(data: &str) -> Result<String, UpstreamFailure> {
    let resp: GeminiResponse = serde_json::from_str(data)?;
    Ok(resp
        .candidates
        .iter()
        .filter_map(|c| c.content.as_ref())
        .flat_map(|c| c.parts.iter())
        .filter_map(|p| p.text.as_deref())
        .collect())
}

fn convert_candidate(position: usize, candidate: &GeminiCandidate) -> Choice {
    let mut text = String::new();
    let mut function_call = None;

    if let Some(content) = &candidate.content {
        for part in &content.parts {
            if let Some(t) = &part.text {
                text.push_str(t);
            }
            if function_call.is_none() {
                if let Some(fc) = &part.function_call {
                    function_call = Some(FunctionCall {
                        name: fc.name.clone(),
                        arguments: fc.args.to_string(),
                    });
                }
            }
        }
    }

    let finish_reason = if function_call.is_some() {
        Some(FinishReason::FunctionCall)
    } else {
        candidate.finish_reason.as_deref().and_then(map_finish_reason)
    };

    let mut message = Message::assistant(text);
    message.function_call = function_call;

    let index = candidate
        .index
        .unwrap_or_else(|| u32::try_from(position).unwrap_or(u32::MAX));
    Choice::message(index, message, finish_reason)
}

/// Parse a JSON object, wrapping anything else so Gemini still gets an object.
fn parse_json_object(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(v @ Value::Object(_)) => v,
        Ok(other) => json!({ "content": other }),
        Err(_) if raw.trim().is_empty() => json!({}),
        Err(_) => json!({ "content": raw }),
    }
}
