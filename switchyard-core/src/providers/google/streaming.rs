//! Streaming support for Gemini responses

use super::types::{CodeAssistChunk, GenerateContentChunk, Part, UsageMetadata};
use crate::http::{parse_data, SseStream};
use crate::protocol::{Api, StopReason, Usage};
use crate::providers::adapter::ToolCallCounter;
use crate::providers::error::{ProviderError, ProviderResult};
use crate::stream::{BlockKind, EventSink};
use futures::StreamExt;

/// Shape of each SSE data payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Envelope {
    /// Bare `GenerateContentResponse`
    Plain,
    /// Cloud Code Assist `{response: ...}`
    CodeAssist,
}

/// Map a Gemini `finishReason`
pub fn map_finish_reason(api: Api, reason: &str, message: Option<&str>) -> ProviderResult<StopReason> {
    let blocked = |what: &str| {
        let detail = message.map(|m| format!(": {m}")).unwrap_or_default();
        Err(ProviderError::Stream(format!("{what} ({reason}){detail}")))
    };
    match reason {
        "STOP" => Ok(StopReason::Stop),
        "MAX_TOKENS" => Ok(StopReason::Length),
        "SAFETY" | "RECITATION" | "LANGUAGE" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" | "IMAGE_SAFETY"
        | "IMAGE_PROHIBITED_CONTENT" | "IMAGE_RECITATION" => blocked("Response blocked"),
        "MALFORMED_FUNCTION_CALL" | "UNEXPECTED_TOOL_CALL" | "TOO_MANY_TOOL_CALLS" => {
            blocked("Model produced an invalid tool call")
        }
        "OTHER" | "FINISH_REASON_UNSPECIFIED" => blocked("Generation stopped"),
        other => Err(ProviderError::UnmappedStopReason {
            api,
            reason: other.to_string(),
        }),
    }
}

fn to_usage(metadata: &UsageMetadata) -> Usage {
    let mut usage = Usage::from_inclusive_prompt(
        metadata.prompt_token_count,
        metadata.cached_content_token_count,
        metadata.candidates_token_count + metadata.thoughts_token_count,
    );
    if metadata.total_token_count > 0 {
        usage.total_tokens = metadata.total_token_count;
    }
    usage
}

fn attach_signature(sink: &mut EventSink, signature: &str) {
    match sink.open_block_kind() {
        Some(BlockKind::Thinking) => sink.set_thinking_signature(signature),
        Some(BlockKind::Text) => sink.set_text_signature(signature),
        Some(BlockKind::ToolCall) => sink.set_thought_signature(signature),
        None => {}
    }
}

fn apply_part(part: Part, sink: &mut EventSink, ids: &ToolCallCounter) {
    let signature = part.thought_signature.filter(|s| !s.is_empty());

    if let Some(call) = part.function_call {
        let id = call
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| ids.next_id(&call.name));
        sink.tool_call_complete(&id, &call.name, call.args.unwrap_or_default(), signature);
        return;
    }

    if let Some(text) = part.text.as_deref().filter(|text| !text.is_empty()) {
        if part.thought.unwrap_or(false) {
            sink.thinking_delta(text);
        } else {
            sink.text_delta(text);
        }
    }
    // Signatures may also arrive on an otherwise empty part.
    if let Some(signature) = signature {
        attach_signature(sink, &signature);
    }
}

/// Apply one chunk, returning the finish reason when it carries one
pub fn apply_chunk(
    api: Api,
    chunk: GenerateContentChunk,
    sink: &mut EventSink,
    ids: &ToolCallCounter,
) -> ProviderResult<Option<StopReason>> {
    if let Some(reason) = chunk.prompt_feedback.and_then(|feedback| feedback.block_reason) {
        return Err(ProviderError::Stream(format!("Prompt blocked ({reason})")));
    }

    if let Some(metadata) = &chunk.usage_metadata {
        sink.set_usage(to_usage(metadata));
    }

    let mut finish = None;
    if let Some(candidate) = chunk.candidates.into_iter().next() {
        for part in candidate.content.map(|content| content.parts).unwrap_or_default() {
            apply_part(part, sink, ids);
        }
        if let Some(reason) = candidate.finish_reason.as_deref() {
            finish = Some(map_finish_reason(api, reason, candidate.finish_message.as_deref())?);
        }
    }
    Ok(finish)
}

/// Drain the SSE stream into `sink`
pub async fn consume(
    api: Api,
    mut events: SseStream,
    envelope: Envelope,
    sink: &mut EventSink,
    ids: &ToolCallCounter,
) -> ProviderResult<StopReason> {
    let mut finish = None;
    while let Some(event) = events.next().await {
        let event = event?;
        let chunk = match envelope {
            Envelope::Plain => parse_data::<GenerateContentChunk>(&event)?,
            Envelope::CodeAssist => parse_data::<CodeAssistChunk>(&event)?.and_then(|wrapped| wrapped.response),
        };
        let Some(chunk) = chunk else {
            continue;
        };
        if let Some(reason) = apply_chunk(api, chunk, sink, ids)? {
            finish = Some(reason);
        }
    }
    Ok(finish.unwrap_or(StopReason::Stop))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ContentBlock, Model};
    use serde_json::json;
    use std::sync::Arc;
    use test_case::test_case;
    use tokio::sync::mpsc;

    fn sink() -> EventSink {
        let model = Model::new("gemini-2.5-pro", Api::GoogleGenerativeAi, "google", "");
        let (tx, _rx) = mpsc::unbounded_channel();
        EventSink::new(Arc::new(model), tx)
    }

    fn apply(sink: &mut EventSink, ids: &ToolCallCounter, value: serde_json::Value) -> Option<StopReason> {
        apply_chunk(Api::GoogleGenerativeAi, serde_json::from_value(value).unwrap(), sink, ids).unwrap()
    }

    #[test_case("STOP", StopReason::Stop)]
    #[test_case("MAX_TOKENS", StopReason::Length)]
    fn test_finish_reasons(reason: &str, expected: StopReason) {
        assert_eq!(map_finish_reason(Api::GoogleVertex, reason, None).unwrap(), expected);
    }

    #[test_case("SAFETY")]
    #[test_case("MALFORMED_FUNCTION_CALL")]
    #[test_case("PROHIBITED_CONTENT")]
    fn test_blocking_reasons_fail(reason: &str) {
        let err = map_finish_reason(Api::GoogleVertex, reason, None).unwrap_err();
        assert!(err.to_string().contains(reason));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_unknown_reason_is_unmapped() {
        assert!(matches!(
            map_finish_reason(Api::GoogleGeminiCli, "NEW_REASON", None),
            Err(ProviderError::UnmappedStopReason { api: Api::GoogleGeminiCli, .. })
        ));
    }

    #[test]
    fn test_thoughts_text_and_signatures() {
        let mut sink = sink();
        let ids = ToolCallCounter::new();
        apply(&mut sink, &ids, json!({"candidates": [{"content": {"parts": [{"text": "Let me", "thought": true}]}}]}));
        apply(&mut sink, &ids, json!({"candidates": [{"content": {"parts": [{"text": " think", "thought": true, "thoughtSignature": "dGg="}]}}]}));
        apply(&mut sink, &ids, json!({"candidates": [{"content": {"parts": [{"text": "Hello"}]}}]}));
        let finish = apply(&mut sink, &ids, json!({
            "candidates": [{"content": {"parts": [{"text": "", "thoughtSignature": "dHg="}]}, "finishReason": "STOP"}],
            "usageMetadata": {"promptTokenCount": 100, "cachedContentTokenCount": 40, "candidatesTokenCount": 5, "thoughtsTokenCount": 7, "totalTokenCount": 112}
        }));
        assert_eq!(finish, Some(StopReason::Stop));

        let message = sink.partial().snapshot();
        match (&message.content[0], &message.content[1]) {
            (ContentBlock::Thinking(thinking), ContentBlock::Text(text)) => {
                assert_eq!(thinking.thinking, "Let me think");
                assert_eq!(thinking.thinking_signature.as_deref(), Some("dGg="));
                assert_eq!(text.text, "Hello");
                assert_eq!(text.text_signature.as_deref(), Some("dHg="));
            }
            other => panic!("unexpected blocks {other:?}"),
        }
        let usage = message.usage;
        assert_eq!((usage.input, usage.cache_read, usage.output, usage.total_tokens), (60, 40, 12, 112));
    }

    #[test]
    fn test_function_calls_get_ids_and_signatures() {
        let mut sink = sink();
        let ids = ToolCallCounter::new();
        apply(&mut sink, &ids, json!({"candidates": [{"content": {"parts": [
            {"functionCall": {"name": "ls", "args": {"dir": "/"}}, "thoughtSignature": "c2ln"},
            {"functionCall": {"name": "ls", "args": {"dir": "/tmp"}}}
        ]}}]}));

        let message = sink.partial().snapshot();
        let calls: Vec<_> = message.tool_calls().collect();
        assert_eq!(calls.len(), 2);
        assert_ne!(calls[0].id, calls[1].id);
        assert!(calls[0].id.starts_with("ls_"));
        assert_eq!(calls[0].thought_signature.as_deref(), Some("c2ln"));
        assert_eq!(calls[1].arguments.get("dir"), Some(&json!("/tmp")));
    }

    #[test]
    fn test_prompt_block_fails() {
        let chunk = serde_json::from_value(json!({"promptFeedback": {"blockReason": "SAFETY"}})).unwrap();
        let err = apply_chunk(Api::GoogleGenerativeAi, chunk, &mut sink(), &ToolCallCounter::new()).unwrap_err();
        assert_eq!(err.to_string(), "Prompt blocked (SAFETY)");
    }
}
