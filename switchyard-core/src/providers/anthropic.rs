//! Anthropic messages adapter
//!
//! Handles the differences in message format: the system prompt travels
//! outside `messages`, consecutive tool results merge into one user turn,
//! and reasoning must be replayed with its signature (or as redacted data).

use crate::http::{join_url, message_from_json, parse_data, sse_events, SseStream, StreamRequest};
use crate::protocol::{
    Api, AssistantMessage, CacheRetention, ContentBlock, ImageContent, Message, StopReason, Tool, ToolResultMessage,
    UserContent, UserContentBlock,
};
use crate::providers::adapter::{AdapterRequest, ApiAdapter};
use crate::providers::credentials::Credential;
use crate::providers::error::{ProviderError, ProviderResult};
use crate::providers::options::{anthropic_tool_choice, ThinkingConfig};
use crate::stream::{BlockKind, EventSink};
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

const BETA_FEATURES: &str = "fine-grained-tool-streaming-2025-05-14,interleaved-thinking-2025-05-14";

const OAUTH_BETA: &str = "oauth-2025-04-20";

/// Adapter for `POST /v1/messages`
#[derive(Debug, Default)]
pub struct AnthropicAdapter;

#[async_trait]
impl ApiAdapter for AnthropicAdapter {
    fn api(&self) -> Api {
        Api::AnthropicMessages
    }

    async fn stream(&self, request: &AdapterRequest, sink: &mut EventSink) -> ProviderResult<StopReason> {
        let body = build_body(request);
        request.emit_payload(&body);

        let url = join_url(&request.model.base_url, "v1/messages");
        let http_request = authorized_request(request, url, body)?;
        let outcome = request
            .http
            .post_stream(&http_request, &request.retry, &request.signal)
            .await?;
        debug!(attempts = outcome.attempts, "messages stream opened");

        consume(sse_events(outcome.value), sink).await
    }
}

fn authorized_request(request: &AdapterRequest, url: String, body: Value) -> ProviderResult<StreamRequest> {
    let base = StreamRequest::new(url, body).header("anthropic-version", ANTHROPIC_VERSION);
    let base = match &request.credential {
        Credential::ApiKey(key) => base
            .header("x-api-key", key.expose_secret())
            .header("anthropic-beta", BETA_FEATURES),
        Credential::OAuthToken(token) => base
            .header("Authorization", format!("Bearer {}", token.expose_secret()))
            .header("anthropic-beta", format!("{OAUTH_BETA},{BETA_FEATURES}")),
        other => {
            return Err(ProviderError::InvalidCredentials {
                provider: request.model.provider.clone(),
                message: format!("{} credentials are not accepted by the messages API", other.kind()),
            })
        }
    };
    let extra = request.extra_headers();
    Ok(base.headers(extra.iter().map(|(name, value)| (name, value))))
}

fn cache_control(retention: CacheRetention) -> Option<Value> {
    match retention {
        CacheRetention::None => None,
        CacheRetention::Short => Some(json!({"type": "ephemeral"})),
        CacheRetention::Long => Some(json!({"type": "ephemeral", "ttl": "1h"})),
    }
}

/// Build the request body
pub fn build_body(request: &AdapterRequest) -> Value {
    let model = &request.model;
    let options = &request.options;
    let cache = cache_control(options.cache_retention());
    let tools = request.context.tools();

    let mut body = Map::new();
    body.insert("model".into(), json!(model.id));
    body.insert(
        "max_tokens".into(),
        json!(options.max_tokens.unwrap_or(model.max_tokens)),
    );
    body.insert("stream".into(), json!(true));

    if let Some(prompt) = request.context.system_prompt.as_deref().filter(|p| !p.is_empty()) {
        let mut block = json!({"type": "text", "text": prompt});
        if let Some(cache) = &cache {
            block["cache_control"] = cache.clone();
        }
        body.insert("system".into(), json!([block]));
    }

    let mut messages = to_messages(&request.context.messages, model.supports_images());
    if let Some(cache) = &cache {
        mark_last_user_block(&mut messages, cache);
    }
    body.insert("messages".into(), Value::Array(messages));

    if !tools.is_empty() {
        body.insert("tools".into(), Value::Array(tools.iter().map(to_tool).collect()));
        if let Some(choice) = &options.tool_choice {
            body.insert("tool_choice".into(), anthropic_tool_choice(choice));
        }
    }

    match request.vendor.claude_thinking() {
        ThinkingConfig::Enabled { budget_tokens } => {
            body.insert("thinking".into(), json!({"type": "enabled", "budget_tokens": budget_tokens}));
        }
        ThinkingConfig::Disabled => {
            if model.reasoning {
                body.insert("thinking".into(), json!({"type": "disabled"}));
            }
            if let Some(temperature) = options.temperature {
                body.insert("temperature".into(), json!(temperature));
            }
        }
    }

    Value::Object(body)
}

fn to_tool(tool: &Tool) -> Value {
    json!({
        "name": tool.name,
        "description": tool.description,
        "input_schema": tool.parameters,
    })
}

fn image_block(image: &ImageContent) -> Value {
    json!({
        "type": "image",
        "source": {"type": "base64", "media_type": image.mime_type, "data": image.data},
    })
}

fn user_blocks(content: &UserContent, images: bool) -> Vec<Value> {
    content
        .parts()
        .iter()
        .filter_map(|part| match part {
            UserContentBlock::Text(text) if text.text.trim().is_empty() => None,
            UserContentBlock::Text(text) => Some(json!({"type": "text", "text": text.text})),
            UserContentBlock::Image(image) if images => Some(image_block(image)),
            UserContentBlock::Image(_) => None,
        })
        .collect()
}

fn assistant_blocks(assistant: &AssistantMessage) -> Vec<Value> {
    assistant
        .content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text(text) if text.text.trim().is_empty() => None,
            ContentBlock::Text(text) => Some(json!({"type": "text", "text": text.text})),
            ContentBlock::Thinking(thinking) if thinking.redacted => thinking
                .thinking_signature
                .as_ref()
                .map(|data| json!({"type": "redacted_thinking", "data": data})),
            ContentBlock::Thinking(thinking) if thinking.thinking.trim().is_empty() => None,
            ContentBlock::Thinking(thinking) => Some(match thinking.thinking_signature.as_deref() {
                Some(signature) if !signature.is_empty() => {
                    json!({"type": "thinking", "thinking": thinking.thinking, "signature": signature})
                }
                // Unsigned reasoning is rejected as thinking; keep it as text.
                _ => json!({"type": "text", "text": thinking.thinking}),
            }),
            ContentBlock::ToolCall(call) => Some(json!({
                "type": "tool_use",
                "id": call.id,
                "name": call.name,
                "input": Value::Object(call.arguments.clone()),
            })),
        })
        .collect()
}

fn tool_result_block(result: &ToolResultMessage, images: bool) -> Value {
    let mut content: Vec<Value> = result
        .content
        .iter()
        .filter_map(|part| match part {
            UserContentBlock::Text(text) => Some(json!({"type": "text", "text": text.text})),
            UserContentBlock::Image(image) if images => Some(image_block(image)),
            UserContentBlock::Image(_) => None,
        })
        .collect();
    if content.is_empty() {
        content.push(json!({"type": "text", "text": "(no output)"}));
    }
    json!({
        "type": "tool_result",
        "tool_use_id": result.tool_call_id,
        "content": content,
        "is_error": result.is_error,
    })
}

/// Convert the history, merging consecutive tool results into one user turn
pub fn to_messages(messages: &[Message], images: bool) -> Vec<Value> {
    let mut out = Vec::with_capacity(messages.len());
    let mut index = 0;

    while index < messages.len() {
        match &messages[index] {
            Message::User(user) => {
                let blocks = user_blocks(&user.content, images);
                if !blocks.is_empty() {
                    out.push(json!({"role": "user", "content": blocks}));
                }
                index += 1;
            }
            Message::Assistant(assistant) => {
                let blocks = assistant_blocks(assistant);
                if !blocks.is_empty() {
                    out.push(json!({"role": "assistant", "content": blocks}));
                }
                index += 1;
            }
            Message::ToolResult(_) => {
                let mut blocks = Vec::new();
                while let Some(Message::ToolResult(result)) = messages.get(index) {
                    blocks.push(tool_result_block(result, images));
                    index += 1;
                }
                out.push(json!({"role": "user", "content": blocks}));
            }
        }
    }

    out
}

fn mark_last_user_block(messages: &mut [Value], cache: &Value) {
    let last_user = messages
        .iter_mut()
        .rev()
        .find(|message| message["role"] == "user");
    if let Some(block) = last_user
        .and_then(|message| message["content"].as_array_mut())
        .and_then(|blocks| blocks.last_mut())
    {
        block["cache_control"] = cache.clone();
    }
}

/// Map a `stop_reason`
pub fn map_stop_reason(reason: &str) -> ProviderResult<StopReason> {
    match reason {
        "end_turn" | "stop_sequence" | "pause_turn" => Ok(StopReason::Stop),
        "max_tokens" | "model_context_window_exceeded" => Ok(StopReason::Length),
        "tool_use" => Ok(StopReason::ToolUse),
        "refusal" => Err(ProviderError::Stream("The model refused to respond".to_string())),
        other => Err(ProviderError::UnmappedStopReason {
            api: Api::AnthropicMessages,
            reason: other.to_string(),
        }),
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    MessageStart {
        message: MessageStart,
    },
    ContentBlockStart {
        content_block: Value,
    },
    ContentBlockDelta {
        delta: Value,
    },
    ContentBlockStop {},
    MessageDelta {
        #[serde(default)]
        delta: MessageDeltaBody,
        #[serde(default)]
        usage: Option<AnthropicUsage>,
    },
    MessageStop {},
    Ping {},
    Error {
        error: Value,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct MessageStart {
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Default, Deserialize)]
struct MessageDeltaBody {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: Option<u64>,
    #[serde(default)]
    output_tokens: Option<u64>,
    #[serde(default)]
    cache_read_input_tokens: Option<u64>,
    #[serde(default)]
    cache_creation_input_tokens: Option<u64>,
}

fn apply_usage(sink: &mut EventSink, usage: AnthropicUsage) {
    sink.update_usage(|current| {
        if let Some(input) = usage.input_tokens {
            current.input = input;
        }
        if let Some(output) = usage.output_tokens {
            current.output = output;
        }
        if let Some(cache_read) = usage.cache_read_input_tokens {
            current.cache_read = cache_read;
        }
        if let Some(cache_write) = usage.cache_creation_input_tokens {
            current.cache_write = cache_write;
        }
        current.total_tokens = current.computed_total();
    });
}

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn apply_event(event: StreamEvent, sink: &mut EventSink, stop: &mut Option<StopReason>) -> ProviderResult<()> {
    match event {
        StreamEvent::MessageStart { message } => {
            if let Some(usage) = message.usage {
                apply_usage(sink, usage);
            }
        }
        StreamEvent::ContentBlockStart { content_block } => match str_field(&content_block, "type") {
            "text" => {
                sink.begin_block(BlockKind::Text);
                sink.text_delta(str_field(&content_block, "text"));
            }
            "thinking" => {
                sink.begin_block(BlockKind::Thinking);
                sink.thinking_delta(str_field(&content_block, "thinking"));
            }
            "redacted_thinking" => sink.redacted_thinking(str_field(&content_block, "data")),
            "tool_use" => {
                sink.begin_tool_call(str_field(&content_block, "id"), str_field(&content_block, "name"));
            }
            other => debug!(block_type = other, "ignoring unknown content block"),
        },
        StreamEvent::ContentBlockDelta { delta } => match str_field(&delta, "type") {
            "text_delta" => sink.text_delta(str_field(&delta, "text")),
            "thinking_delta" => sink.thinking_delta(str_field(&delta, "thinking")),
            "signature_delta" => sink.append_thinking_signature(str_field(&delta, "signature")),
            "input_json_delta" => sink.tool_call_delta(None, None, str_field(&delta, "partial_json")),
            other => debug!(delta_type = other, "ignoring unknown delta"),
        },
        StreamEvent::ContentBlockStop {} => sink.end_block(),
        StreamEvent::MessageDelta { delta, usage } => {
            if let Some(usage) = usage {
                apply_usage(sink, usage);
            }
            if let Some(reason) = delta.stop_reason.as_deref() {
                *stop = Some(map_stop_reason(reason)?);
            }
        }
        StreamEvent::Error { error } => {
            let message = message_from_json(&json!({ "error": error })).unwrap_or_else(|| error.to_string());
            return Err(ProviderError::Stream(message));
        }
        StreamEvent::MessageStop {} | StreamEvent::Ping {} | StreamEvent::Unknown => {}
    }
    Ok(())
}

/// Drain the SSE stream into `sink`
pub async fn consume(mut events: SseStream, sink: &mut EventSink) -> ProviderResult<StopReason> {
    let mut stop = None;
    while let Some(event) = events.next().await {
        let event = event?;
        let Some(event) = parse_data::<StreamEvent>(&event)? else {
            continue;
        };
        apply_event(event, sink, &mut stop)?;
    }
    Ok(stop.unwrap_or(StopReason::Stop))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Model, ThinkingContent, ToolCall};
    use std::sync::Arc;
    use test_case::test_case;
    use tokio::sync::mpsc;

    #[test_case("end_turn", StopReason::Stop)]
    #[test_case("stop_sequence", StopReason::Stop)]
    #[test_case("pause_turn", StopReason::Stop)]
    #[test_case("max_tokens", StopReason::Length)]
    #[test_case("model_context_window_exceeded", StopReason::Length)]
    #[test_case("tool_use", StopReason::ToolUse)]
    fn test_stop_reasons(reason: &str, expected: StopReason) {
        assert_eq!(map_stop_reason(reason).unwrap(), expected);
    }

    #[test]
    fn test_refusal_and_unknown_reasons_fail() {
        assert!(matches!(map_stop_reason("refusal"), Err(ProviderError::Stream(_))));
        assert!(matches!(
            map_stop_reason("sensitive"),
            Err(ProviderError::UnmappedStopReason { .. })
        ));
    }

    #[test]
    fn test_consecutive_tool_results_merge() {
        let mut assistant = AssistantMessage::empty(Api::AnthropicMessages, "anthropic", "claude");
        assistant.content.push(ContentBlock::ToolCall(ToolCall {
            id: "toolu_1".into(),
            name: "a".into(),
            ..Default::default()
        }));
        assistant.content.push(ContentBlock::ToolCall(ToolCall {
            id: "toolu_2".into(),
            name: "b".into(),
            ..Default::default()
        }));
        let messages = vec![
            Message::user("go"),
            Message::Assistant(assistant),
            Message::tool_result("toolu_1", "a", "one"),
            Message::tool_result("toolu_2", "b", "two"),
        ];
        let out = to_messages(&messages, false);
        assert_eq!(out.len(), 3);
        assert_eq!(out[2]["role"], "user");
        assert_eq!(out[2]["content"].as_array().unwrap().len(), 2);
        assert_eq!(out[2]["content"][1]["tool_use_id"], "toolu_2");
    }

    #[test]
    fn test_thinking_replay() {
        let mut assistant = AssistantMessage::empty(Api::AnthropicMessages, "anthropic", "claude");
        assistant.content.push(ContentBlock::Thinking(ThinkingContent {
            thinking: "signed".into(),
            thinking_signature: Some("sig".into()),
            redacted: false,
        }));
        assistant.content.push(ContentBlock::Thinking(ThinkingContent {
            thinking: "[Reasoning redacted]".into(),
            thinking_signature: Some("opaque".into()),
            redacted: true,
        }));
        assistant.content.push(ContentBlock::thinking("unsigned"));
        let blocks = assistant_blocks(&assistant);
        assert_eq!(blocks[0], json!({"type": "thinking", "thinking": "signed", "signature": "sig"}));
        assert_eq!(blocks[1], json!({"type": "redacted_thinking", "data": "opaque"}));
        assert_eq!(blocks[2], json!({"type": "text", "text": "unsigned"}));
    }

    #[test]
    fn test_cache_marker_on_last_user_block() {
        let mut messages = to_messages(&[Message::user("a"), Message::user("b")], false);
        mark_last_user_block(&mut messages, &json!({"type": "ephemeral", "ttl": "1h"}));
        assert!(messages[0]["content"][0].get("cache_control").is_none());
        assert_eq!(messages[1]["content"][0]["cache_control"]["ttl"], "1h");
    }

    #[test]
    fn test_stream_events_and_usage() {
        let model = Model::new("claude-sonnet-4-5", Api::AnthropicMessages, "anthropic", "");
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut sink = EventSink::new(Arc::new(model), tx);
        let mut stop = None;
        let events = [
            json!({"type": "message_start", "message": {"usage": {"input_tokens": 12, "output_tokens": 1, "cache_read_input_tokens": 100, "cache_creation_input_tokens": 5}}}),
            json!({"type": "content_block_start", "index": 0, "content_block": {"type": "thinking", "thinking": ""}}),
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "thinking_delta", "thinking": "hmm"}}),
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "signature_delta", "signature": "abc"}}),
            json!({"type": "content_block_stop", "index": 0}),
            json!({"type": "content_block_start", "index": 1, "content_block": {"type": "tool_use", "id": "toolu_1", "name": "read", "input": {}}}),
            json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "{\"path\": \"x\"}"}}),
            json!({"type": "content_block_stop", "index": 1}),
            json!({"type": "message_delta", "delta": {"stop_reason": "tool_use"}, "usage": {"output_tokens": 40}}),
            json!({"type": "message_stop"}),
        ];
        for event in events {
            apply_event(serde_json::from_value(event).unwrap(), &mut sink, &mut stop).unwrap();
        }

        assert_eq!(stop, Some(StopReason::ToolUse));
        let message = sink.partial().snapshot();
        let usage = message.usage;
        assert_eq!((usage.input, usage.output, usage.cache_read, usage.cache_write), (12, 40, 100, 5));
        assert_eq!(usage.total_tokens, 157);
        match &message.content[0] {
            ContentBlock::Thinking(thinking) => assert_eq!(thinking.thinking_signature.as_deref(), Some("abc")),
            other => panic!("unexpected {other:?}"),
        }
        let calls: Vec<_> = message.tool_calls().collect();
        assert_eq!(calls[0].arguments.get("path"), Some(&json!("x")));
    }
}
