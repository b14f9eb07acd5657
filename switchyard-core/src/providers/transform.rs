//! Conversation history transformer
//!
//! Reconciles a message history with the model about to receive it. Turns
//! produced by a different provider or API lose vendor-only state (reasoning
//! signatures, thought signatures), keep their reasoning as plain text and
//! get tool-call ids the target accepts. A second pass repairs tool-call /
//! tool-result pairing so every call the target sees has exactly one result.

use crate::protocol::{
    AssistantMessage, ContentBlock, Message, Model, StopReason, TextContent, ToolResultMessage,
    UserContentBlock,
};
use crate::providers::adapter::requires_strict_tool_call_ids;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Longest tool-call id accepted by strict vendors
pub const MAX_TOOL_CALL_ID_LEN: usize = 40;

/// Result text for calls that never received one
pub const NO_RESULT_TEXT: &str = "No result provided";

/// Result text for calls cut off by a failed or aborted turn
pub const ABORTED_RESULT_TEXT: &str = "Tool execution was aborted";

/// Rewrite a tool-call id to the strict charset
///
/// Characters outside `[A-Za-z0-9_-]` are dropped, so a composite
/// `call_id|item_id` keeps both halves, and the result is cut to 40 chars.
pub fn normalize_tool_call_id(id: &str) -> String {
    let normalized: String = id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .take(MAX_TOOL_CALL_ID_LEN)
        .collect();
    if normalized.is_empty() {
        "call".to_string()
    } else {
        normalized
    }
}

/// Transform `messages` for `model`
pub fn transform_messages(messages: &[Message], model: &Model) -> Vec<Message> {
    let strict = requires_strict_tool_call_ids(model);
    let converted = convert_foreign_turns(messages, model, strict);
    repair_tool_pairing(converted)
}

fn is_failure(message: &AssistantMessage) -> bool {
    matches!(message.stop_reason, StopReason::Error | StopReason::Aborted)
}

fn convert_foreign_turns(messages: &[Message], model: &Model, strict: bool) -> Vec<Message> {
    let mut id_map: HashMap<String, String> = HashMap::new();
    let mut out = Vec::with_capacity(messages.len());

    for message in messages {
        match message {
            Message::User(_) => out.push(message.clone()),
            Message::ToolResult(result) => {
                let mut result = result.clone();
                if let Some(mapped) = id_map.get(&result.tool_call_id) {
                    result.tool_call_id = mapped.clone();
                }
                out.push(Message::ToolResult(result));
            }
            Message::Assistant(assistant) => {
                let same_origin = assistant.provider == model.provider && assistant.api == model.api;
                if same_origin {
                    if is_failure(assistant) && assistant.content.is_empty() {
                        continue;
                    }
                    out.push(message.clone());
                    continue;
                }

                let mut rewritten = assistant.clone();
                rewritten.content = assistant
                    .content
                    .iter()
                    .filter_map(|block| convert_block(block, strict, &mut id_map))
                    .collect();

                if rewritten.content.is_empty() && is_failure(&rewritten) {
                    debug!(
                        provider = %assistant.provider,
                        api = %assistant.api,
                        "dropping failed turn without content"
                    );
                    continue;
                }
                out.push(Message::Assistant(rewritten));
            }
        }
    }

    out
}

fn convert_block(block: &ContentBlock, strict: bool, id_map: &mut HashMap<String, String>) -> Option<ContentBlock> {
    match block {
        ContentBlock::Thinking(thinking) => {
            if thinking.redacted || thinking.thinking.trim().is_empty() {
                None
            } else {
                Some(ContentBlock::Text(TextContent {
                    text: thinking.thinking.clone(),
                    text_signature: None,
                }))
            }
        }
        ContentBlock::Text(text) => Some(ContentBlock::Text(TextContent {
            text: text.text.clone(),
            text_signature: None,
        })),
        ContentBlock::ToolCall(call) => {
            let mut call = call.clone();
            call.thought_signature = None;
            if strict {
                let normalized = normalize_tool_call_id(&call.id);
                if normalized != call.id {
                    id_map.insert(call.id.clone(), normalized.clone());
                    call.id = normalized;
                }
            }
            Some(ContentBlock::ToolCall(call))
        }
    }
}

fn synthetic_result(id: &str, name: &str, text: &str, timestamp: i64) -> Message {
    Message::ToolResult(ToolResultMessage {
        tool_call_id: id.to_string(),
        tool_name: name.to_string(),
        content: vec![UserContentBlock::text(text)],
        is_error: true,
        timestamp,
    })
}

struct Pending {
    calls: Vec<(String, String)>,
    timestamp: i64,
}

impl Pending {
    fn flush(&mut self, out: &mut Vec<Message>) {
        for (id, name) in self.calls.drain(..) {
            out.push(synthetic_result(&id, &name, NO_RESULT_TEXT, self.timestamp));
        }
    }

    /// Take the call answered by `id`, if it is still open
    fn answer(&mut self, id: &str) -> bool {
        match self.calls.iter().position(|(call_id, _)| call_id == id) {
            Some(position) => {
                self.calls.remove(position);
                true
            }
            None => false,
        }
    }
}

/// Ids of the tool results directly following `position`
fn adjacent_results(messages: &[Message], position: usize) -> HashSet<&str> {
    messages[position + 1..]
        .iter()
        .map_while(|message| match message {
            Message::ToolResult(result) => Some(result.tool_call_id.as_str()),
            _ => None,
        })
        .collect()
}

fn repair_tool_pairing(messages: Vec<Message>) -> Vec<Message> {
    let mut out = Vec::with_capacity(messages.len());
    let mut pending = Pending {
        calls: Vec::new(),
        timestamp: 0,
    };

    for (position, message) in messages.iter().enumerate() {
        match message {
            Message::Assistant(assistant) => {
                pending.flush(&mut out);
                out.push(message.clone());
                pending.timestamp = assistant.timestamp;

                let mut seen = HashSet::new();
                let calls: Vec<(String, String)> = assistant
                    .tool_calls()
                    .filter(|call| seen.insert(call.id.as_str()))
                    .map(|call| (call.id.clone(), call.name.clone()))
                    .collect();

                if is_failure(assistant) {
                    let answered = adjacent_results(&messages, position);
                    let (kept, aborted): (Vec<_>, Vec<_>) =
                        calls.into_iter().partition(|(id, _)| answered.contains(id.as_str()));
                    for (id, name) in aborted {
                        out.push(synthetic_result(&id, &name, ABORTED_RESULT_TEXT, assistant.timestamp));
                    }
                    pending.calls = kept;
                } else {
                    pending.calls = calls;
                }
            }
            Message::ToolResult(result) => {
                if pending.answer(&result.tool_call_id) {
                    out.push(message.clone());
                } else {
                    debug!(tool_call_id = %result.tool_call_id, "dropping tool result with no open call");
                }
            }
            Message::User(_) => {
                pending.flush(&mut out);
                out.push(message.clone());
            }
        }
    }
    pending.flush(&mut out);

    out
}
