//! Mock-based tests for the vendor adapters.
//!
//! These tests use wiremock to simulate the OpenAI and Gemini APIs
//! without making actual HTTP requests.

use futures::StreamExt;
use letllm_rust::core::{init_metrics, ProviderError, UpstreamFailure};
use letllm_rust::providers::{ByteStream, GeminiProvider, OpenAIProvider, Provider};
use letllm_rust::transformer::{
    FinishReason, FunctionDefinition, GenerateRequest, Message, ProviderCapabilities, StandardRequest,
};
use serde_json::json;
use std::time::Duration;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, Request, ResponseTemplate,
};

fn openai(server: &MockServer) -> OpenAIProvider {
    init_metrics();
    OpenAIProvider::new(reqwest::Client::new(), "sk-test").with_base_url(&format!("{}/v1", server.uri()))
}

fn gemini(server: &MockServer) -> GeminiProvider {
    init_metrics();
    GeminiProvider::new(reqwest::Client::new(), "g-test").with_base_url(&format!("{}/v1beta", server.uri()))
}

fn chat(model: &str, messages: Vec<Message>) -> GenerateRequest {
    GenerateRequest::from(StandardRequest::new(model, messages))
}

fn sse(events: &[&str]) -> String {
    events.iter().map(|e| format!("data: {}\n\n", e)).collect()
}

async fn drain(mut stream: ByteStream) -> (String, Option<ProviderError>) {
    let mut text = String::new();
    while let Some(item) = stream.next().await {
        match item {
            Ok(bytes) => text.push_str(std::str::from_utf8(&bytes).unwrap()),
            Err(e) => return (text, Some(e)),
        }
    }
    (text, None)
}

fn last_body(requests: &[Request]) -> serde_json::Value {
    serde_json::from_slice(&requests.last().unwrap().body).unwrap()
}

// ============================================================================
// OpenAI
// ============================================================================

#[tokio::test]
async fn test_openai_generate_maps_request_and_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-4",
            "messages": [
                {"role": "system", "content": "Be brief."},
                {"role": "user", "content": "Hello"}
            ],
            "temperature": 0.5,
            "max_tokens": 64
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-abc",
            "object": "chat.completion",
            "created": 1700000000,
            "model": "gpt-4-0613",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Hi!"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 9, "completion_tokens": 2, "total_tokens": 11},
            "system_fingerprint": "fp_test"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut request = chat("gpt-4", vec![Message::system("Be brief."), Message::user("Hello")]);
    request.request.temperature = Some(0.5);
    request.request.max_tokens = Some(64);

    let generated = openai(&server).generate(&request).await.unwrap();
    assert_eq!(generated.provider_specific["system_fingerprint"], "fp_test");

    let response = generated.response;

    assert_eq!(response.id, "chatcmpl-abc");
    assert_eq!(response.model, "gpt-4-0613");
    assert_eq!(response.created, 1_700_000_000);
    assert_eq!(response.first_content(), "Hi!");
    assert_eq!(response.choices[0].finish_reason, Some(FinishReason::Stop));
    assert_eq!(response.usage.prompt_tokens, 9);
    assert_eq!(response.usage.completion_tokens, 2);
    assert_eq!(response.usage.total_tokens, 11);

    let body = last_body(&server.received_requests().await.unwrap());
    assert!(body.get("stream").is_none());
    assert!(body.get("top_p").is_none());
}

#[tokio::test]
async fn test_openai_function_call_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-fn",
            "model": "gpt-4",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "function_call": {"name": "get_weather", "arguments": "{\"city\":\"Paris\"}"}
                },
                "finish_reason": "function_call"
            }]
        })))
        .mount(&server)
        .await;

    let request = chat("gpt-4", vec![Message::user("Weather in Paris?")]);
    let response = openai(&server).generate(&request).await.unwrap().response;

    let message = response.choices[0].message.as_ref().unwrap();
    assert_eq!(message.content, "");
    let call = message.function_call.as_ref().unwrap();
    assert_eq!(call.name, "get_weather");
    assert_eq!(call.arguments, "{\"city\":\"Paris\"}");
    assert_eq!(response.choices[0].finish_reason, Some(FinishReason::FunctionCall));
    // No usage reported
    assert_eq!(response.usage.total_tokens, 0);
}

#[tokio::test]
async fn test_openai_functions_dropped_when_unsupported() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "x",
            "model": "gpt-4",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "ok"}, "finish_reason": "stop"}]
        })))
        .mount(&server)
        .await;

    let functions = vec![FunctionDefinition {
        name: "lookup".into(),
        description: "Look something up".into(),
        parameters: json!({"type": "object"}),
    }];
    let request = GenerateRequest::from(
        StandardRequest::new("gpt-4", vec![Message::user("hi")]).with_functions(functions),
    );

    let provider = openai(&server).with_capabilities(ProviderCapabilities {
        supports_functions: false,
        ..OpenAIProvider::default_capabilities()
    });
    provider.generate(&request).await.unwrap();

    let full = openai(&server);
    full.generate(&request).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    let without: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let with: serde_json::Value = serde_json::from_slice(&requests[1].body).unwrap();
    assert!(without.get("functions").is_none());
    assert_eq!(with["functions"][0]["name"], "lookup");
}

#[tokio::test]
async fn test_openai_provider_specific_keys_are_merged() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"model": "gpt-4", "user": "tenant-7"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "x",
            "model": "gpt-4",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "ok"}, "finish_reason": "stop"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut request = chat("gpt-4", vec![Message::user("hi")]);
    request.provider_specific.insert("user".into(), json!("tenant-7"));
    // Mapped fields win over provider-specific ones
    request.provider_specific.insert("model".into(), json!("other"));

    openai(&server).generate(&request).await.unwrap();
}

#[tokio::test]
async fn test_openai_error_status_is_upstream_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}
        })))
        .mount(&server)
        .await;

    let request = chat("gpt-4", vec![Message::user("hi")]);
    let err = openai(&server).generate(&request).await.unwrap_err();

    match err {
        ProviderError::Upstream {
            provider,
            operation,
            source: UpstreamFailure::Status { status, message },
        } => {
            assert_eq!(provider, "openai");
            assert_eq!(operation, "generate");
            assert_eq!(status, 401);
            assert_eq!(message, "Incorrect API key provided");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_openai_empty_choices_is_upstream_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "x", "model": "gpt-4", "choices": []})))
        .mount(&server)
        .await;

    let err = openai(&server)
        .generate(&chat("gpt-4", vec![Message::user("hi")]))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ProviderError::Upstream {
            source: UpstreamFailure::Protocol(_),
            ..
        }
    ));
}

#[tokio::test]
async fn test_openai_invalid_request_makes_no_call() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = openai(&server)
        .generate(&chat("gpt-4", vec![]))
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::InvalidRequest(_)));
}

#[tokio::test]
async fn test_openai_timeout() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let provider = openai(&server).with_request_timeout(Duration::from_millis(100));
    let err = provider
        .generate(&chat("gpt-4", vec![Message::user("hi")]))
        .await
        .unwrap_err();

    match err {
        ProviderError::Upstream { source, .. } => assert!(source.is_timeout()),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_openai_stream_yields_delta_text() {
    let server = MockServer::start().await;

    let body = sse(&[
        r#"{"id":"c","object":"chat.completion.chunk","choices":[{"index":0,"delta":{"role":"assistant"}}]}"#,
        r#"{"id":"c","object":"chat.completion.chunk","choices":[{"index":0,"delta":{"content":"He"}}]}"#,
        r#"{"id":"c","object":"chat.completion.chunk","choices":[{"index":0,"delta":{"content":"llo"}}]}"#,
        r#"{"id":"c","object":"chat.completion.chunk","choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#,
        "[DONE]",
    ]);

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let request = chat("gpt-4", vec![Message::user("hi")]);
    let stream = openai(&server).stream_generate(&request).await.unwrap();
    let (text, err) = drain(stream).await;

    assert!(err.is_none());
    assert_eq!(text, "Hello");
}

#[tokio::test]
async fn test_openai_stream_malformed_event_is_stream_error() {
    let server = MockServer::start().await;

    let body = sse(&[
        r#"{"choices":[{"index":0,"delta":{"content":"ok"}}]}"#,
        "{not json",
    ]);

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let stream = openai(&server)
        .stream_generate(&chat("gpt-4", vec![Message::user("hi")]))
        .await
        .unwrap();
    let (text, err) = drain(stream).await;

    assert_eq!(text, "ok");
    assert!(matches!(err, Some(ProviderError::Stream { .. })));
}

#[tokio::test]
async fn test_openai_stream_error_status_fails_before_streaming() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let result = openai(&server)
        .stream_generate(&chat("gpt-4", vec![Message::user("hi")]))
        .await;

    match result {
        Err(ProviderError::Upstream {
            operation,
            source: UpstreamFailure::Status { status, message },
            ..
        }) => {
            assert_eq!(operation, "stream_generate");
            assert_eq!(status, 503);
            assert_eq!(message, "overloaded");
        }
        Err(other) => panic!("unexpected error: {:?}", other),
        Ok(_) => panic!("expected an error"),
    }
}

#[tokio::test]
async fn test_closed_provider_rejects_calls() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let provider = openai(&server);
    provider.close().await.unwrap();

    let request = chat("gpt-4", vec![Message::user("hi")]);
    assert!(matches!(
        provider.generate(&request).await,
        Err(ProviderError::Closed(_))
    ));
    assert!(matches!(
        provider.stream_generate(&request).await,
        Err(ProviderError::Closed(_))
    ));
    assert_eq!(provider.info().status, "closed");
}

// ============================================================================
// Gemini
// ============================================================================

#[tokio::test]
async fn test_gemini_generate_maps_request_and_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-pro:generateContent"))
        .and(header("x-goog-api-key", "g-test"))
        .and(body_partial_json(json!({
            "contents": [
                {"role": "user", "parts": [{"text": "Be brief.\n\nHello"}]},
                {"role": "model", "parts": [{"text": "Hi"}]},
                {"role": "user", "parts": [{"text": "How are you?"}]}
            ],
            "generationConfig": {"maxOutputTokens": 100}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Fine, "}, {"text": "thanks."}]},
                "finishReason": "STOP",
                "index": 0
            }],
            "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 3, "totalTokenCount": 15},
            "modelVersion": "gemini-pro-001"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut request = chat(
        "gemini-pro",
        vec![
            Message::system("Be brief."),
            Message::user("Hello"),
            Message::assistant("Hi"),
            Message::user("How are you?"),
        ],
    );
    request.request.max_tokens = Some(100);

    let generated = gemini(&server).generate(&request).await.unwrap();
    assert_eq!(generated.provider_specific["modelVersion"], "gemini-pro-001");

    let response = generated.response;
    assert!(response.id.starts_with("chatcmpl-"));
    assert_eq!(response.model, "gemini-pro");
    assert_eq!(response.first_content(), "Fine, thanks.");
    assert_eq!(response.choices[0].finish_reason, Some(FinishReason::Stop));
    assert_eq!(response.usage.prompt_tokens, 12);
    assert_eq!(response.usage.completion_tokens, 3);
    assert_eq!(response.usage.total_tokens, 15);

    let body = last_body(&server.received_requests().await.unwrap());
    assert!(body.get("tools").is_none());
}

#[tokio::test]
async fn test_gemini_safety_block() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-pro:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        })))
        .mount(&server)
        .await;

    let response = gemini(&server)
        .generate(&chat("gemini-pro", vec![Message::user("something")]))
        .await
        .unwrap()
        .response;

    assert_eq!(response.choices.len(), 1);
    assert_eq!(response.first_content(), "");
    assert_eq!(response.choices[0].finish_reason, Some(FinishReason::ContentFilter));
}

#[tokio::test]
async fn test_gemini_function_call_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-pro:generateContent"))
        .and(body_partial_json(json!({
            "tools": [{"functionDeclarations": [{"name": "get_weather"}]}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"functionCall": {"name": "get_weather", "args": {"city": "Paris"}}}
                ]},
                "finishReason": "STOP"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let request = GenerateRequest::from(
        StandardRequest::new("gemini-pro", vec![Message::user("Weather?")]).with_functions(vec![
            FunctionDefinition {
                name: "get_weather".into(),
                description: "Current weather".into(),
                parameters: json!({"type": "object", "properties": {"city": {"type": "string"}}}),
            },
        ]),
    );

    let response = gemini(&server).generate(&request).await.unwrap().response;
    let message = response.choices[0].message.as_ref().unwrap();
    let call = message.function_call.as_ref().unwrap();

    assert_eq!(call.name, "get_weather");
    let args: serde_json::Value = serde_json::from_str(&call.arguments).unwrap();
    assert_eq!(args, json!({"city": "Paris"}));
    assert_eq!(response.choices[0].finish_reason, Some(FinishReason::FunctionCall));
}

#[tokio::test]
async fn test_gemini_no_candidates_is_upstream_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-pro:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
        .mount(&server)
        .await;

    let err = gemini(&server)
        .generate(&chat("gemini-pro", vec![Message::user("hi")]))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ProviderError::Upstream {
            source: UpstreamFailure::Protocol(_),
            ..
        }
    ));
}

#[tokio::test]
async fn test_gemini_error_status() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-pro:generateContent"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"code": 400, "message": "API key not valid", "status": "INVALID_ARGUMENT"}
        })))
        .mount(&server)
        .await;

    let err = gemini(&server)
        .generate(&chat("gemini-pro", vec![Message::user("hi")]))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ProviderError::Upstream {
            source: UpstreamFailure::Status { status: 400, ref message },
            ..
        } if message == "API key not valid"
    ));
}

#[tokio::test]
async fn test_gemini_stream_yields_delta_text() {
    let server = MockServer::start().await;

    let body = sse(&[
        r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hel"}]}}]}"#,
        r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"lo"}]}}]}"#,
        r#"{"candidates":[{"content":{"role":"model","parts":[{"text":""}]},"finishReason":"STOP"}]}"#,
    ]);

    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-pro:streamGenerateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let stream = gemini(&server)
        .stream_generate(&chat("gemini-pro", vec![Message::user("hi")]))
        .await
        .unwrap();
    let (text, err) = drain(stream).await;

    assert!(err.is_none());
    assert_eq!(text, "Hello");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests[0].url.query(), Some("alt=sse"));
}

#[tokio::test]
async fn test_gemini_capabilities() {
    let provider = GeminiProvider::new(reqwest::Client::new(), "k");
    let caps = provider.capabilities();
    assert!(!caps.supports_system_role);
    assert!(caps.supports_streaming);
    assert_eq!(caps.max_tokens, 2048);
    assert_eq!(provider.name(), "gemini");
    assert_eq!(provider.info().status, "active");
}
