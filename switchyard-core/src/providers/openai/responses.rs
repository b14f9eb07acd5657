//! OpenAI responses API adapter
//!
//! Requests are stateless (`store: false`): reasoning items travel back to
//! the server inside the thinking signature, serialized whole, and tool-call
//! ids are composite `call_id|item_id` so both halves survive the round trip.

use super::{bearer_request, data_url};
use crate::http::{join_url, message_from_json, parse_data, sse_events, SseStream};
use crate::protocol::{
    Api, AssistantMessage, CacheRetention, ContentBlock, Message, Model, StopReason, ToolResultMessage, Usage,
    UserContent, UserContentBlock,
};
use crate::providers::adapter::{AdapterRequest, ApiAdapter};
use crate::providers::error::{ProviderError, ProviderResult};
use crate::providers::options::openai_responses_tool_choice;
use crate::stream::{BlockKind, EventSink};
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

/// Adapter for `POST /responses`
#[derive(Debug, Default)]
pub struct OpenAiResponsesAdapter;

#[async_trait]
impl ApiAdapter for OpenAiResponsesAdapter {
    fn api(&self) -> Api {
        Api::OpenAiResponses
    }

    async fn stream(&self, request: &AdapterRequest, sink: &mut EventSink) -> ProviderResult<StopReason> {
        let body = build_body(request);
        request.emit_payload(&body);

        let url = join_url(&request.model.base_url, "responses");
        let http_request = bearer_request(request, url, body)?;
        let outcome = request
            .http
            .post_stream(&http_request, &request.retry, &request.signal)
            .await?;
        debug!(attempts = outcome.attempts, "responses stream opened");

        consume(sse_events(outcome.value), sink).await
    }
}

/// Build the request body
pub fn build_body(request: &AdapterRequest) -> Value {
    let model = &request.model;
    let options = &request.options;
    let tools = request.context.tools();

    let mut object = Map::new();
    object.insert("model".into(), json!(model.id));
    object.insert(
        "input".into(),
        Value::Array(to_input(model, request.context.system_prompt.as_deref(), &request.context.messages)),
    );
    object.insert("stream".into(), json!(true));
    object.insert("store".into(), json!(false));

    if let Some(max_tokens) = options.max_tokens {
        object.insert("max_output_tokens".into(), json!(max_tokens));
    }
    if let Some(temperature) = options.temperature {
        object.insert("temperature".into(), json!(temperature));
    }
    if !tools.is_empty() {
        let tools: Vec<Value> = tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.parameters,
                    "strict": false,
                })
            })
            .collect();
        object.insert("tools".into(), Value::Array(tools));
        if let Some(choice) = &options.tool_choice {
            object.insert("tool_choice".into(), openai_responses_tool_choice(choice));
        }
    }
    if let Some(effort) = request.vendor.reasoning_effort() {
        object.insert("reasoning".into(), json!({"effort": effort, "summary": "auto"}));
        object.insert("include".into(), json!(["reasoning.encrypted_content"]));
    }

    let retention = options.cache_retention();
    if retention != CacheRetention::None {
        if let Some(session_id) = &options.session_id {
            object.insert("prompt_cache_key".into(), json!(session_id));
        }
        if retention == CacheRetention::Long {
            object.insert("prompt_cache_retention".into(), json!("24h"));
        }
    }

    Value::Object(object)
}

/// Split a composite `call_id|item_id`
fn split_tool_call_id(id: &str) -> (&str, Option<&str>) {
    match id.split_once('|') {
        Some((call_id, item_id)) => (call_id, Some(item_id).filter(|item| !item.is_empty())),
        None => (id, None),
    }
}

/// Convert the history into `input` items
pub fn to_input(model: &Model, system_prompt: Option<&str>, messages: &[Message]) -> Vec<Value> {
    let mut items = Vec::new();

    if let Some(prompt) = system_prompt.filter(|p| !p.is_empty()) {
        let role = if model.reasoning { "developer" } else { "system" };
        items.push(json!({"role": role, "content": prompt}));
    }

    for message in messages {
        match message {
            Message::User(user) => {
                if let Some(item) = user_item(model, &user.content) {
                    items.push(item);
                }
            }
            Message::Assistant(assistant) => items.extend(assistant_items(assistant)),
            Message::ToolResult(result) => items.extend(tool_result_items(model, result)),
        }
    }

    items
}

fn image_part(image: &crate::protocol::ImageContent) -> Value {
    json!({"type": "input_image", "detail": "auto", "image_url": data_url(image)})
}

fn user_item(model: &Model, content: &UserContent) -> Option<Value> {
    let parts: Vec<Value> = content
        .parts()
        .iter()
        .filter_map(|part| match part {
            UserContentBlock::Text(text) => Some(json!({"type": "input_text", "text": text.text})),
            UserContentBlock::Image(image) if model.supports_images() => Some(image_part(image)),
            UserContentBlock::Image(_) => None,
        })
        .collect();
    (!parts.is_empty()).then(|| json!({"role": "user", "content": parts}))
}

fn assistant_items(assistant: &AssistantMessage) -> Vec<Value> {
    let mut items = Vec::new();
    for block in &assistant.content {
        match block {
            ContentBlock::Thinking(thinking) => {
                // Same-origin reasoning replays the stored item verbatim.
                let item = thinking
                    .thinking_signature
                    .as_deref()
                    .and_then(|sig| serde_json::from_str::<Value>(sig).ok())
                    .filter(|item| item.get("type").and_then(Value::as_str) == Some("reasoning"));
                if let Some(item) = item {
                    items.push(item);
                }
            }
            ContentBlock::Text(text) => {
                if text.text.is_empty() {
                    continue;
                }
                let mut item = json!({
                    "type": "message",
                    "role": "assistant",
                    "status": "completed",
                    "content": [{"type": "output_text", "text": text.text, "annotations": []}],
                });
                if let Some(id) = text.text_signature.as_deref().filter(|id| id.starts_with("msg")) {
                    item["id"] = json!(id);
                }
                items.push(item);
            }
            ContentBlock::ToolCall(call) => {
                let (call_id, item_id) = split_tool_call_id(&call.id);
                let mut item = json!({
                    "type": "function_call",
                    "call_id": call_id,
                    "name": call.name,
                    "arguments": Value::Object(call.arguments.clone()).to_string(),
                });
                if let Some(item_id) = item_id {
                    item["id"] = json!(item_id);
                }
                items.push(item);
            }
        }
    }
    items
}

fn tool_result_items(model: &Model, result: &ToolResultMessage) -> Vec<Value> {
    let (call_id, _) = split_tool_call_id(&result.tool_call_id);
    let images: Vec<Value> = if model.supports_images() {
        result.images().map(image_part).collect()
    } else {
        Vec::new()
    };
    let mut text = result.text_content();
    if text.is_empty() && !images.is_empty() {
        text = "(see attached image)".to_string();
    }

    let mut items = vec![json!({"type": "function_call_output", "call_id": call_id, "output": text})];
    if !images.is_empty() {
        let mut content = vec![json!({"type": "input_text", "text": "Attached image(s) from tool result:"})];
        content.extend(images);
        items.push(json!({"role": "user", "content": content}));
    }
    items
}

/// Streamed event, keyed by `type`
#[derive(Debug, Deserialize)]
struct ResponseEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    item: Option<Value>,
    #[serde(default)]
    delta: Option<String>,
    #[serde(default)]
    response: Option<ResponseBody>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ResponseBody {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    usage: Option<ResponseUsage>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    incomplete_details: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ResponseUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
    #[serde(default)]
    input_tokens_details: Option<InputTokensDetails>,
}

#[derive(Debug, Deserialize)]
struct InputTokensDetails {
    #[serde(default)]
    cached_tokens: u64,
}

/// Map a terminal response status
pub fn map_status(status: &str) -> ProviderResult<StopReason> {
    match status {
        "completed" | "queued" | "in_progress" => Ok(StopReason::Stop),
        "incomplete" => Ok(StopReason::Length),
        "failed" | "cancelled" => Err(ProviderError::Stream(format!("Response {status}"))),
        other => Err(ProviderError::UnmappedStopReason {
            api: Api::OpenAiResponses,
            reason: other.to_string(),
        }),
    }
}

fn item_str<'a>(item: &'a Value, key: &str) -> Option<&'a str> {
    item.get(key).and_then(Value::as_str)
}

fn apply_event(event: ResponseEvent, sink: &mut EventSink) -> ProviderResult<Option<StopReason>> {
    match event.kind.as_str() {
        "response.output_item.added" => {
            let Some(item) = event.item else {
                return Ok(None);
            };
            match item_str(&item, "type") {
                Some("reasoning") => {
                    sink.begin_block(BlockKind::Thinking);
                }
                Some("message") => {
                    sink.begin_block(BlockKind::Text);
                }
                Some("function_call") => {
                    let call_id = item_str(&item, "call_id").unwrap_or_default();
                    let item_id = item_str(&item, "id").unwrap_or_default();
                    let name = item_str(&item, "name").unwrap_or_default();
                    sink.begin_tool_call(&format!("{call_id}|{item_id}"), name);
                }
                _ => {}
            }
        }
        "response.reasoning_summary_text.delta" | "response.reasoning_text.delta" => {
            if let Some(delta) = event.delta.as_deref() {
                sink.thinking_delta(delta);
            }
        }
        "response.reasoning_summary_part.done" => {
            if sink.open_block_kind() == Some(BlockKind::Thinking) {
                sink.thinking_delta("\n\n");
            }
        }
        "response.output_text.delta" | "response.refusal.delta" => {
            if let Some(delta) = event.delta.as_deref() {
                sink.text_delta(delta);
            }
        }
        "response.function_call_arguments.delta" => {
            if let Some(delta) = event.delta.as_deref() {
                sink.tool_call_delta(None, None, delta);
            }
        }
        "response.output_item.done" => {
            let Some(item) = event.item else {
                return Ok(None);
            };
            match item_str(&item, "type") {
                Some("reasoning") => {
                    if sink.open_block_kind() != Some(BlockKind::Thinking) {
                        sink.begin_block(BlockKind::Thinking);
                    }
                    sink.set_thinking_signature(item.to_string());
                }
                Some("message") => {
                    if let Some(id) = item_str(&item, "id") {
                        sink.set_text_signature(id);
                    }
                }
                Some("function_call") => {
                    // Arguments that never streamed arrive whole here.
                    if sink.open_block_kind() != Some(BlockKind::ToolCall) {
                        let call_id = item_str(&item, "call_id").unwrap_or_default();
                        let item_id = item_str(&item, "id").unwrap_or_default();
                        let arguments = item_str(&item, "arguments")
                            .and_then(|raw| serde_json::from_str::<Map<String, Value>>(raw).ok())
                            .unwrap_or_default();
                        sink.tool_call_complete(
                            &format!("{call_id}|{item_id}"),
                            item_str(&item, "name").unwrap_or_default(),
                            arguments,
                            None,
                        );
                        return Ok(None);
                    }
                }
                _ => {}
            }
            sink.end_block();
        }
        "response.completed" | "response.incomplete" | "response.failed" => {
            let Some(response) = event.response else {
                return Ok(Some(StopReason::Stop));
            };
            if let Some(usage) = &response.usage {
                let cached = usage.input_tokens_details.as_ref().map_or(0, |d| d.cached_tokens);
                let mut mapped = Usage::from_inclusive_prompt(usage.input_tokens, cached, usage.output_tokens);
                if usage.total_tokens > 0 {
                    mapped.total_tokens = usage.total_tokens;
                }
                sink.set_usage(mapped);
            }
            if let Some(error) = response.error.as_ref().filter(|e| !e.is_null()) {
                let message = message_from_json(&json!({ "error": error })).unwrap_or_else(|| error.to_string());
                return Err(ProviderError::Stream(message));
            }
            if let Some(details) = response.incomplete_details.as_ref().filter(|d| !d.is_null()) {
                debug!(details = %details, "response incomplete");
            }
            let status = response.status.as_deref().unwrap_or("completed");
            return map_status(status).map(Some);
        }
        "error" => {
            let message = event.message.unwrap_or_else(|| "Unknown error".to_string());
            let message = match event.code {
                Some(code) if !code.is_null() => format!("{message} ({code})"),
                _ => message,
            };
            return Err(ProviderError::Stream(message));
        }
        _ => {}
    }
    Ok(None)
}

/// Drain the SSE stream into `sink`
pub async fn consume(mut events: SseStream, sink: &mut EventSink) -> ProviderResult<StopReason> {
    let mut finish = None;
    while let Some(event) = events.next().await {
        let event = event?;
        let Some(event) = parse_data::<ResponseEvent>(&event)? else {
            continue;
        };
        if let Some(reason) = apply_event(event, sink)? {
            finish = Some(reason);
        }
    }
    Ok(finish.unwrap_or(StopReason::Stop))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ThinkingContent, ToolCall};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn model() -> Model {
        Model::new("gpt-5", Api::OpenAiResponses, "openai", "https://api.openai.com/v1").with_reasoning(true)
    }

    fn apply(sink: &mut EventSink, value: Value) -> ProviderResult<Option<StopReason>> {
        apply_event(serde_json::from_value(value).unwrap(), sink)
    }

    #[test]
    fn test_composite_ids_round_trip() {
        let mut assistant = AssistantMessage::empty(Api::OpenAiResponses, "openai", "gpt-5");
        assistant.content.push(ContentBlock::ToolCall(ToolCall {
            id: "call_1|fc_1".into(),
            name: "read".into(),
            ..Default::default()
        }));
        let messages = vec![
            Message::Assistant(assistant),
            Message::tool_result("call_1|fc_1", "read", "ok"),
        ];
        let input = to_input(&model(), None, &messages);
        assert_eq!(input[0]["call_id"], "call_1");
        assert_eq!(input[0]["id"], "fc_1");
        assert_eq!(input[1], json!({"type": "function_call_output", "call_id": "call_1", "output": "ok"}));
    }

    #[test]
    fn test_reasoning_item_replayed_from_signature() {
        let stored = json!({"type": "reasoning", "id": "rs_1", "encrypted_content": "opaque", "summary": []});
        let mut assistant = AssistantMessage::empty(Api::OpenAiResponses, "openai", "gpt-5");
        assistant.content.push(ContentBlock::Thinking(ThinkingContent {
            thinking: "summary".into(),
            thinking_signature: Some(stored.to_string()),
            redacted: false,
        }));
        let input = to_input(&model(), Some("sys"), &[Message::Assistant(assistant)]);
        assert_eq!(input[0]["role"], "developer");
        assert_eq!(input[1], stored);
    }

    #[test]
    fn test_event_lifecycle() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut sink = EventSink::new(Arc::new(model()), tx);

        apply(&mut sink, json!({"type": "response.output_item.added", "item": {"type": "reasoning", "id": "rs_1"}})).unwrap();
        apply(&mut sink, json!({"type": "response.reasoning_summary_text.delta", "delta": "plan"})).unwrap();
        apply(&mut sink, json!({"type": "response.output_item.done", "item": {"type": "reasoning", "id": "rs_1", "summary": []}})).unwrap();
        apply(&mut sink, json!({"type": "response.output_item.added", "item": {"type": "function_call", "id": "fc_1", "call_id": "call_1", "name": "read"}})).unwrap();
        apply(&mut sink, json!({"type": "response.function_call_arguments.delta", "delta": "{\"p\":1}"})).unwrap();
        apply(&mut sink, json!({"type": "response.output_item.done", "item": {"type": "function_call", "id": "fc_1"}})).unwrap();
        let finish = apply(
            &mut sink,
            json!({"type": "response.completed", "response": {
                "status": "completed",
                "usage": {"input_tokens": 50, "output_tokens": 10, "total_tokens": 60,
                          "input_tokens_details": {"cached_tokens": 20}}
            }}),
        )
        .unwrap();

        assert_eq!(finish, Some(StopReason::Stop));
        let message = sink.partial().snapshot();
        assert_eq!(message.usage.input, 30);
        assert_eq!(message.usage.cache_read, 20);
        match &message.content[0] {
            ContentBlock::Thinking(thinking) => {
                assert_eq!(thinking.thinking, "plan");
                assert!(thinking.thinking_signature.as_deref().unwrap().contains("rs_1"));
            }
            other => panic!("unexpected {other:?}"),
        }
        let calls: Vec<_> = message.tool_calls().collect();
        assert_eq!(calls[0].id, "call_1|fc_1");
        assert_eq!(calls[0].arguments.get("p"), Some(&json!(1)));
    }

    #[test]
    fn test_statuses() {
        assert_eq!(map_status("incomplete").unwrap(), StopReason::Length);
        assert_eq!(map_status("in_progress").unwrap(), StopReason::Stop);
        assert!(map_status("failed").is_err());
        assert!(matches!(
            map_status("paused").unwrap_err(),
            ProviderError::UnmappedStopReason { .. }
        ));
    }
}
