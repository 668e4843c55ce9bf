//! AWS Bedrock Converse translator.
//!
//! Converts a chat-completions body into Bedrock's Converse/ConverseStream
//! parameters and translates the response back into an OpenAI-shaped
//! JSON object. Bedrock authenticates via IAM, not `api_key` — the
//! per-client `upstream_api_key` is ignored by this provider.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use aws_sdk_bedrockruntime::error::SdkError;
use aws_sdk_bedrockruntime::operation::converse::ConverseError;
use aws_sdk_bedrockruntime::operation::converse_stream::ConverseStreamError;
use aws_sdk_bedrockruntime::types as br;
use aws_sdk_bedrockruntime::Client;
use futures::stream::Stream;
use serde_json::{json, Value};

use lr_types::{AppError, AppResult, ProviderResponse, StreamChunk};

use crate::{ChunkStream, Provider};

pub struct BedrockProvider {
    client: Client,
}

impl BedrockProvider {
    pub fn new(client: Client) -> Self {
        BedrockProvider { client }
    }

    /// Build an SDK client from ambient AWS configuration, scoped to the
    /// given region.
    pub async fn from_env(region: &str) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if !region.is_empty() {
            loader = loader.region(aws_config::Region::new(region.to_string()));
        }
        let sdk_config = loader.load().await;
        BedrockProvider::new(Client::new(&sdk_config))
    }
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn require_model_id(model_id: &str) -> AppResult<()> {
    if model_id.is_empty() {
        return Err(AppError::BedrockModelIdRequired);
    }
    Ok(())
}

/// Split chat-completions `messages` into Bedrock `system` text blocks
/// and `messages`.
fn split_messages(body: &Value) -> (Vec<br::SystemContentBlock>, Vec<br::Message>) {
    let mut system = Vec::new();
    let mut messages = Vec::new();

    for m in body.get("messages").and_then(Value::as_array).into_iter().flatten() {
        let role = m.get("role").and_then(Value::as_str).unwrap_or("user");
        let text = extract_text(m.get("content").unwrap_or(&Value::Null));

        if role == "system" {
            system.push(br::SystemContentBlock::Text(text));
        } else {
            let bedrock_role = if role == "assistant" {
                br::ConversationRole::Assistant
            } else {
                br::ConversationRole::User
            };
            if let Ok(msg) = br::Message::builder()
                .role(bedrock_role)
                .content(br::ContentBlock::Text(text))
                .build()
            {
                messages.push(msg);
            }
        }
    }

    (system, messages)
}

/// Concatenate the textual parts of a chat-completions `content` field,
/// which may be a plain string or a list of `{type, text}` parts.
fn extract_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter(|p| p.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

fn inference_config(body: &Value) -> Option<br::InferenceConfiguration> {
    let mut builder = br::InferenceConfiguration::builder();
    let mut any = false;

    if let Some(t) = body.get("temperature").and_then(Value::as_f64) {
        builder = builder.temperature(t as f32);
        any = true;
    }
    if let Some(mt) = body.get("max_tokens").and_then(Value::as_i64) {
        builder = builder.max_tokens(mt as i32);
        any = true;
    }
    if let Some(tp) = body.get("top_p").and_then(Value::as_f64) {
        builder = builder.top_p(tp as f32);
        any = true;
    }
    if let Some(stop) = body.get("stop") {
        let stops: Vec<String> = match stop {
            Value::String(s) => vec![s.clone()],
            Value::Array(arr) => arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect(),
            _ => Vec::new(),
        };
        if !stops.is_empty() {
            builder = builder.set_stop_sequences(Some(stops));
            any = true;
        }
    }

    any.then(|| builder.build())
}

fn finish_reason_for(stop_reason: &str) -> &'static str {
    if stop_reason == "max_tokens" {
        "length"
    } else {
        "stop"
    }
}

fn content_blocks_to_text(blocks: &[br::ContentBlock]) -> String {
    blocks
        .iter()
        .filter_map(|block| match block {
            br::ContentBlock::Text(t) => Some(t.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("")
}

/// Bedrock response → OpenAI-shaped chat-completion object.
fn translate_response(
    output: Option<br::ConverseOutput>,
    stop_reason: &str,
    usage: Option<br::TokenUsage>,
    model_id: &str,
) -> AppResult<Value> {
    let text = match output {
        Some(br::ConverseOutput::Message(msg)) => content_blocks_to_text(msg.content()),
        _ => return Err(AppError::Upstream("Bedrock returned no output message".to_string())),
    };

    let prompt_tokens = usage.as_ref().map(|u| u.input_tokens).unwrap_or(0);
    let completion_tokens = usage.as_ref().map(|u| u.output_tokens).unwrap_or(0);

    Ok(json!({
        "id": format!("bedrock-{}", now_unix()),
        "object": "chat.completion",
        "created": now_unix(),
        "model": model_id,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": text},
            "finish_reason": finish_reason_for(stop_reason),
        }],
        "usage": {
            "prompt_tokens": prompt_tokens,
            "completion_tokens": completion_tokens,
            "total_tokens": prompt_tokens + completion_tokens,
        }
    }))
}

fn map_converse_error<R>(err: SdkError<ConverseError, R>) -> AppError {
    match err.into_service_error() {
        ConverseError::ThrottlingException(_) => AppError::UpstreamThrottled,
        ConverseError::ValidationException(e) => {
            AppError::UpstreamValidation(e.message().unwrap_or("validation error").to_string())
        }
        ConverseError::AccessDeniedException(_) => AppError::UpstreamAccessDenied,
        ConverseError::ModelNotReadyException(_) => AppError::UpstreamModelNotReady,
        other => AppError::Upstream(format!("Bedrock error: {other}")),
    }
}

fn map_converse_stream_error<R>(err: SdkError<ConverseStreamError, R>) -> AppError {
    match err.into_service_error() {
        ConverseStreamError::ThrottlingException(_) => AppError::UpstreamThrottled,
        ConverseStreamError::ValidationException(e) => {
            AppError::UpstreamValidation(e.message().unwrap_or("validation error").to_string())
        }
        ConverseStreamError::AccessDeniedException(_) => AppError::UpstreamAccessDenied,
        ConverseStreamError::ModelStreamErrorException(_) => AppError::UpstreamModelNotReady,
        other => AppError::Upstream(format!("Bedrock stream error: {other}")),
    }
}

#[async_trait]
impl Provider for BedrockProvider {
    async fn unary(&self, body: &Value, _api_key: &str, model_id: &str) -> AppResult<ProviderResponse> {
        require_model_id(model_id)?;

        let (system, messages) = split_messages(body);
        let mut request = self.client.converse().model_id(model_id).set_messages(Some(messages));
        if !system.is_empty() {
            request = request.set_system(Some(system));
        }
        if let Some(cfg) = inference_config(body) {
            request = request.inference_config(cfg);
        }

        let response = request.send().await.map_err(map_converse_error)?;
        let stop_reason = response.stop_reason.as_str();
        let body = translate_response(response.output, stop_reason, response.usage, model_id)?;

        Ok(ProviderResponse { status_code: 200, body })
    }

    async fn stream(&self, body: &Value, _api_key: &str, model_id: &str) -> AppResult<ChunkStream> {
        require_model_id(model_id)?;

        let (system, messages) = split_messages(body);
        let mut request = self
            .client
            .converse_stream()
            .model_id(model_id)
            .set_messages(Some(messages));
        if !system.is_empty() {
            request = request.set_system(Some(system));
        }
        if let Some(cfg) = inference_config(body) {
            request = request.inference_config(cfg);
        }

        let response = request.send().await.map_err(map_converse_stream_error)?;
        Ok(Box::pin(bedrock_event_stream(response.stream, model_id.to_string())))
    }
}

/// Drain the Bedrock event receiver into OpenAI-shaped `StreamChunk`s:
/// one chunk per `contentBlockDelta`, a final `delta: {}` chunk carrying
/// `finish_reason` on `messageStop`, then the `[DONE]` terminator.
fn bedrock_event_stream(
    mut events: aws_smithy_types::event_stream::Receiver<
        br::ConverseStreamOutput,
        ConverseStreamError,
    >,
    model_id: String,
) -> impl Stream<Item = AppResult<StreamChunk>> + Send + 'static {
    async_stream::stream! {
        loop {
            match events.recv().await {
                Ok(Some(br::ConverseStreamOutput::ContentBlockDelta(delta_event))) => {
                    let text = match delta_event.delta {
                        Some(br::ContentBlockDelta::Text(t)) => t,
                        _ => continue,
                    };
                    if text.is_empty() {
                        continue;
                    }
                    let chunk_json = json!({
                        "id": format!("bedrock-{}", now_unix()),
                        "object": "chat.completion.chunk",
                        "created": now_unix(),
                        "model": model_id,
                        "choices": [{"index": 0, "delta": {"content": text.clone()}, "finish_reason": Value::Null}],
                    });
                    yield Ok(StreamChunk {
                        data: chunk_json.to_string(),
                        is_done: false,
                        text_delta: text,
                    });
                }
                Ok(Some(br::ConverseStreamOutput::MessageStop(stop))) => {
                    let stop_reason = stop.stop_reason.as_str();
                    let chunk_json = json!({
                        "id": format!("bedrock-{}", now_unix()),
                        "object": "chat.completion.chunk",
                        "created": now_unix(),
                        "model": model_id,
                        "choices": [{"index": 0, "delta": {}, "finish_reason": finish_reason_for(stop_reason)}],
                    });
                    yield Ok(StreamChunk {
                        data: chunk_json.to_string(),
                        is_done: false,
                        text_delta: String::new(),
                    });
                    yield Ok(StreamChunk::done());
                    break;
                }
                Ok(Some(_)) => continue,
                Ok(None) => {
                    yield Ok(StreamChunk::done());
                    break;
                }
                Err(err) => {
                    yield Err(AppError::Upstream(format!("Bedrock stream error: {err}")));
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_text_handles_string_content() {
        assert_eq!(extract_text(&json!("hello")), "hello");
    }

    #[test]
    fn extract_text_keeps_only_text_parts() {
        let content = json!([
            {"type": "text", "text": "hi"},
            {"type": "image_url", "image_url": {"url": "x"}},
            {"type": "text", "text": "there"}
        ]);
        assert_eq!(extract_text(&content), "hi\nthere");
    }

    #[test]
    fn split_messages_separates_system_from_conversation() {
        let body = json!({
            "messages": [
                {"role": "system", "content": "You are helpful."},
                {"role": "user", "content": "Hello"}
            ]
        });
        let (system, messages) = split_messages(&body);
        assert_eq!(system.len(), 1);
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn split_messages_matches_converse_shape_for_the_canonical_fixture() {
        // A system turn plus a single user turn, the canonical shape.
        let body = json!({
            "messages": [
                {"role": "system", "content": "You are helpful."},
                {"role": "user", "content": "Hello"}
            ],
            "temperature": 0.5,
            "max_tokens": 100
        });
        let (system, messages) = split_messages(&body);

        match &system[0] {
            br::SystemContentBlock::Text(t) => assert_eq!(t, "You are helpful."),
            other => panic!("expected a text system block, got {other:?}"),
        }

        assert_eq!(messages[0].role, br::ConversationRole::User);
        match &messages[0].content()[0] {
            br::ContentBlock::Text(t) => assert_eq!(t, "Hello"),
            other => panic!("expected a text content block, got {other:?}"),
        }

        let cfg = inference_config(&body).unwrap();
        assert_eq!(cfg.temperature(), Some(0.5));
        assert_eq!(cfg.max_tokens(), Some(100));
    }

    #[test]
    fn inference_config_only_includes_present_keys() {
        let body = json!({"temperature": 0.5, "max_tokens": 100});
        let cfg = inference_config(&body).unwrap();
        assert_eq!(cfg.temperature(), Some(0.5));
        assert_eq!(cfg.max_tokens(), Some(100));
        assert_eq!(cfg.top_p(), None);
    }

    #[test]
    fn inference_config_is_none_when_nothing_present() {
        assert!(inference_config(&json!({})).is_none());
    }

    #[test]
    fn finish_reason_maps_max_tokens_to_length() {
        assert_eq!(finish_reason_for("max_tokens"), "length");
        assert_eq!(finish_reason_for("end_turn"), "stop");
    }
}
