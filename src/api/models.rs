//! API request and response models.
//!
//! This module defines the OpenAI-compatible wire shapes served by the
//! gateway and their conversions to and from the Standard Model.

use crate::transformer::{
    FinishReason, FunctionCall, FunctionDefinition, GenerateRequest, Message, ProviderInfo,
    StandardRequest, StandardResponse, StreamChunk, Usage, OBJECT_CHAT_COMPLETION,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Chat completion request following OpenAI API format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    /// Model identifier
    #[serde(default)]
    pub model: String,

    /// Conversation messages
    #[serde(default)]
    pub messages: Vec<ChatMessage>,

    /// Whether to stream the response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i64>,

    /// Sampling temperature (0.0 to 2.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<FunctionDefinition>,

    /// Extra vendor body keys, passed through untouched
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub provider_specific: Map<String, Value>,
}

impl ChatCompletionRequest {
    pub fn is_stream(&self) -> bool {
        self.stream.unwrap_or(false)
    }
}

impl From<ChatCompletionRequest> for GenerateRequest {
    fn from(req: ChatCompletionRequest) -> Self {
        let stream = req.is_stream();
        let request = StandardRequest {
            model: req.model,
            messages: req.messages.into_iter().map(Message::from).collect(),
            stream,
            max_tokens: req.max_tokens,
            temperature: req.temperature,
            top_p: req.top_p,
            functions: req.functions,
            metadata: None,
        };
        GenerateRequest {
            request,
            provider_specific: req.provider_specific,
        }
    }
}

/// A single message in a conversation.
///
/// `content` may be null on assistant messages that only carry a function call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
}

impl From<ChatMessage> for Message {
    fn from(msg: ChatMessage) -> Self {
        Message {
            role: msg.role,
            content: msg.content.unwrap_or_default(),
            name: msg.name,
            function_call: msg.function_call,
            metadata: None,
        }
    }
}

/// Chat completion response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

/// A single choice in the response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: ResponseMessage,
    pub finish_reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
}

impl From<StandardResponse> for ChatCompletionResponse {
    fn from(resp: StandardResponse) -> Self {
        let choices = resp
            .choices
            .into_iter()
            .map(|c| {
                let message = c.message.or(c.delta).unwrap_or_default();
                Choice {
                    index: c.index,
                    message: ResponseMessage {
                        role: "assistant".to_string(),
                        content: message.content,
                        function_call: message.function_call,
                    },
                    finish_reason: c
                        .finish_reason
                        .unwrap_or(FinishReason::Stop)
                        .as_str()
                        .to_string(),
                }
            })
            .collect();

        Self {
            id: resp.id,
            object: OBJECT_CHAT_COMPLETION.to_string(),
            created: resp.created,
            model: resp.model,
            choices,
            usage: resp.usage,
        }
    }
}

/// Streaming response chunk as sent on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkFrame {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<StreamChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChoice {
    pub index: u32,
    pub delta: Delta,
    /// Always serialized, `null` until the stream ends
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delta {
    pub role: String,
    pub content: String,
}

impl From<&StreamChunk> for ChunkFrame {
    fn from(chunk: &StreamChunk) -> Self {
        Self {
            id: chunk.id.clone(),
            object: chunk.object.clone(),
            created: chunk.created,
            model: chunk.model.clone(),
            choices: chunk
                .choices
                .iter()
                .map(|c| StreamChoice {
                    index: c.index,
                    delta: Delta {
                        role: "assistant".to_string(),
                        content: c
                            .delta
                            .as_ref()
                            .map(|d| d.content.clone())
                            .unwrap_or_default(),
                    },
                    finish_reason: c.finish_reason.map(|f| f.as_str().to_string()),
                })
                .collect(),
        }
    }
}

/// Provider listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderList {
    pub object: String,
    pub data: Vec<ProviderInfo>,
}

/// List of available models.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelList {
    pub object: String,
    pub data: Vec<ModelInfo>,
}

/// Information about a single model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub object: String,
    pub owned_by: String,
}

impl ModelList {
    /// Build the listing from provider infos, first provider wins on duplicates.
    pub fn from_providers(infos: &[ProviderInfo]) -> Self {
        let mut data: Vec<ModelInfo> = Vec::new();
        for info in infos {
            for model in &info.capabilities.supported_models {
                if !data.iter().any(|m| &m.id == model) {
                    data.push(ModelInfo {
                        id: model.clone(),
                        object: "model".to_string(),
                        owned_by: info.name.clone(),
                    });
                }
            }
        }
        Self {
            object: "list".to_string(),
            data,
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub providers: usize,
}
