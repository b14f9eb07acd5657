//! Stream event handling for the Bedrock Converse API

use crate::protocol::{Api, StopReason, Usage};
use crate::providers::error::{ProviderError, ProviderResult};
use crate::stream::EventSink;
use aws_sdk_bedrockruntime::types::{
    ContentBlockDelta, ContentBlockStart, ConverseStreamOutput, ReasoningContentBlockDelta, TokenUsage,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::debug;

/// Map a Converse `stopReason`
pub fn map_stop_reason(reason: &str) -> ProviderResult<StopReason> {
    match reason {
        "end_turn" | "stop_sequence" => Ok(StopReason::Stop),
        "max_tokens" | "model_context_window_exceeded" => Ok(StopReason::Length),
        "tool_use" => Ok(StopReason::ToolUse),
        "guardrail_intervened" => Err(ProviderError::Stream("Response blocked by a Bedrock guardrail".to_string())),
        "content_filtered" => Err(ProviderError::Stream("Response blocked by the content filter".to_string())),
        other => Err(ProviderError::UnmappedStopReason {
            api: Api::BedrockConverseStream,
            reason: other.to_string(),
        }),
    }
}

fn token_count(value: i32) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

/// Usage from Converse token counts; input already excludes cache reads
pub fn usage_from_tokens(input: i32, output: i32, cache_read: Option<i32>, cache_write: Option<i32>) -> Usage {
    let mut usage = Usage {
        input: token_count(input),
        output: token_count(output),
        cache_read: cache_read.map(token_count).unwrap_or(0),
        cache_write: cache_write.map(token_count).unwrap_or(0),
        ..Usage::default()
    };
    usage.total_tokens = usage.computed_total();
    usage
}

fn apply_usage(sink: &mut EventSink, usage: &TokenUsage) {
    sink.set_usage(usage_from_tokens(
        usage.input_tokens(),
        usage.output_tokens(),
        usage.cache_read_input_tokens(),
        usage.cache_write_input_tokens(),
    ));
}

/// Apply one stream event, recording the stop reason when it carries one
pub fn apply_event(
    event: ConverseStreamOutput,
    sink: &mut EventSink,
    stop: &mut Option<StopReason>,
) -> ProviderResult<()> {
    match event {
        ConverseStreamOutput::MessageStart(_) => {}
        ConverseStreamOutput::ContentBlockStart(start) => match start.start() {
            Some(ContentBlockStart::ToolUse(tool_use)) => {
                sink.begin_tool_call(tool_use.tool_use_id(), tool_use.name());
            }
            other => debug!(start = ?other, "ignoring content block start"),
        },
        ConverseStreamOutput::ContentBlockDelta(delta) => match delta.delta() {
            Some(ContentBlockDelta::Text(text)) => sink.text_delta(text),
            Some(ContentBlockDelta::ToolUse(tool_use)) => sink.tool_call_delta(None, None, tool_use.input()),
            Some(ContentBlockDelta::ReasoningContent(reasoning)) => match reasoning {
                ReasoningContentBlockDelta::Text(text) => sink.thinking_delta(text),
                ReasoningContentBlockDelta::Signature(signature) => sink.append_thinking_signature(signature),
                ReasoningContentBlockDelta::RedactedContent(data) => {
                    sink.redacted_thinking(BASE64.encode(data.as_ref()))
                }
                other => debug!(delta = ?other, "ignoring reasoning delta"),
            },
            other => debug!(delta = ?other, "ignoring content block delta"),
        },
        ConverseStreamOutput::ContentBlockStop(_) => sink.end_block(),
        ConverseStreamOutput::MessageStop(message_stop) => {
            *stop = Some(map_stop_reason(message_stop.stop_reason().as_str())?);
        }
        ConverseStreamOutput::Metadata(metadata) => {
            if let Some(usage) = metadata.usage() {
                apply_usage(sink, usage);
            }
        }
        other => debug!(event = ?other, "ignoring stream event"),
    }
    Ok(())
}
