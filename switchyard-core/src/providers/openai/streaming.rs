//! Streaming support for chat-completions responses

use super::types::{ChatChunk, ChunkUsage};
use crate::http::{message_from_json, parse_data, SseStream};
use crate::protocol::{Api, StopReason, Usage};
use crate::providers::adapter::ToolCallCounter;
use crate::providers::error::{ProviderError, ProviderResult};
use crate::stream::{BlockKind, EventSink};
use futures::StreamExt;

/// Map a `finish_reason`
pub fn map_finish_reason(reason: &str) -> ProviderResult<StopReason> {
    match reason {
        "stop" => Ok(StopReason::Stop),
        "length" => Ok(StopReason::Length),
        "tool_calls" | "function_call" => Ok(StopReason::ToolUse),
        "content_filter" => Err(ProviderError::Stream(
            "Response blocked by the provider content filter".to_string(),
        )),
        other => Err(ProviderError::UnmappedStopReason {
            api: Api::OpenAiCompletions,
            reason: other.to_string(),
        }),
    }
}

fn to_usage(usage: &ChunkUsage) -> Usage {
    let cached = usage
        .prompt_tokens_details
        .and_then(|details| details.cached_tokens)
        .unwrap_or(0);
    let mut out = Usage::from_inclusive_prompt(usage.prompt_tokens, cached, usage.completion_tokens);
    if let Some(total) = usage.total_tokens.filter(|total| *total > 0) {
        out.total_tokens = total;
    }
    out
}

/// Apply one chunk, returning the finish reason when it carries one
pub fn apply_chunk(
    chunk: ChatChunk,
    sink: &mut EventSink,
    ids: &ToolCallCounter,
) -> ProviderResult<Option<StopReason>> {
    if let Some(error) = chunk.error {
        let message = message_from_json(&serde_json::json!({ "error": error }))
            .unwrap_or_else(|| error.to_string());
        return Err(ProviderError::Stream(message));
    }

    if let Some(usage) = &chunk.usage {
        sink.set_usage(to_usage(usage));
    }

    let mut finish = None;
    for choice in chunk.choices {
        if let Some(usage) = &choice.usage {
            sink.set_usage(to_usage(usage));
        }

        if let Some(delta) = choice.delta {
            if let Some((field, text)) = delta.reasoning_delta() {
                sink.thinking_delta(text);
                sink.set_thinking_signature(field);
            }
            if let Some(text) = delta.content.as_deref().filter(|text| !text.is_empty()) {
                sink.text_delta(text);
            }
            for call in delta.tool_calls.unwrap_or_default() {
                let function = call.function.unwrap_or_default();
                let id = call.id.filter(|id| !id.is_empty());
                let id = match id {
                    Some(id) => Some(id),
                    None if sink.open_block_kind() == Some(BlockKind::ToolCall) => None,
                    None => Some(ids.next_id(function.name.as_deref().unwrap_or("call"))),
                };
                sink.tool_call_delta(
                    id.as_deref(),
                    function.name.as_deref(),
                    function.arguments.as_deref().unwrap_or_default(),
                );
            }
        }

        if let Some(reason) = choice.finish_reason.as_deref() {
            finish = Some(map_finish_reason(reason)?);
        }
    }
    Ok(finish)
}

/// Drain the SSE stream into `sink`
pub async fn consume(mut events: SseStream, sink: &mut EventSink, ids: &ToolCallCounter) -> ProviderResult<StopReason> {
    let mut finish = None;
    while let Some(event) = events.next().await {
        let event = event?;
        let Some(chunk) = parse_data::<ChatChunk>(&event)? else {
            continue;
        };
        if let Some(reason) = apply_chunk(chunk, sink, ids)? {
            finish = Some(reason);
        }
    }
    Ok(finish.unwrap_or(StopReason::Stop))
}
