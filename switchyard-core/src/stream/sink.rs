//! Writer side of the canonical event stream
//!
//! [`EventSink`] owns the single write path into a request's
//! [`PartialMessage`]. Adapters feed it vendor deltas; it applies the
//! block-transition algorithm, keeps the tool-call argument buffers, runs
//! cost accounting and emits the matching events.

use crate::protocol::{
    calculate_cost, now_millis, AssistantMessage, AssistantMessageEvent, ContentBlock, Cost,
    Model, PartialMessage, StopReason, ThinkingContent, ToolCall, Usage,
};
use crate::providers::error::ProviderError;
use crate::stream::partial_json::parse_partial_json;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

/// Kind of the block currently receiving deltas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Text,
    Thinking,
    ToolCall,
}

#[derive(Debug)]
struct OpenBlock {
    kind: BlockKind,
    index: usize,
    tool_call_id: Option<String>,
    arguments: String,
}

/// Single writer for one streaming request
pub struct EventSink {
    tx: UnboundedSender<AssistantMessageEvent>,
    partial: PartialMessage,
    model: Arc<Model>,
    current: Option<OpenBlock>,
    started_at: Instant,
    first_delta_seen: bool,
    terminated: bool,
}

impl EventSink {
    pub fn new(model: Arc<Model>, tx: UnboundedSender<AssistantMessageEvent>) -> Self {
        let message = AssistantMessage::empty(model.api, model.provider.clone(), model.id.clone());
        Self {
            tx,
            partial: PartialMessage::new(message),
            model,
            current: None,
            started_at: Instant::now(),
            first_delta_seen: false,
            terminated: false,
        }
    }

    pub fn partial(&self) -> PartialMessage {
        self.partial.clone()
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// True when no content block has been produced
    pub fn is_empty(&self) -> bool {
        self.partial.read(|message| message.content.is_empty())
    }

    fn emit(&self, event: AssistantMessageEvent) {
        if self.terminated {
            return;
        }
        // A closed receiver means the consumer ended the stream.
        let _ = self.tx.send(event);
    }

    fn mark_first_delta(&mut self) {
        if !self.first_delta_seen {
            self.first_delta_seen = true;
            let ttft = self.started_at.elapsed().as_millis() as u64;
            self.partial.update(|message| message.ttft = Some(ttft));
        }
    }

    /// Emit the `start` event
    pub fn start(&mut self) {
        self.emit(AssistantMessageEvent::Start {
            partial: self.partial(),
        });
    }

    /// Install a fresh accumulator before re-issuing a request
    pub fn reset(&mut self) {
        if self.terminated {
            return;
        }
        self.current = None;
        self.first_delta_seen = false;
        let api = self.model.api;
        self.partial.update(|message| {
            *message = AssistantMessage::empty(api, message.provider.clone(), message.model.clone());
            message.timestamp = now_millis();
        });
    }

    fn current_kind(&self) -> Option<BlockKind> {
        self.current.as_ref().map(|block| block.kind)
    }

    /// Close the open block, if any, emitting its `*_end` event
    pub fn end_block(&mut self) {
        let Some(block) = self.current.take() else {
            return;
        };
        let partial = self.partial();
        let index = block.index;
        match block.kind {
            BlockKind::Text => {
                let content = self.partial.read(|message| match message.content.get(index) {
                    Some(ContentBlock::Text(text)) => text.text.clone(),
                    _ => String::new(),
                });
                self.emit(AssistantMessageEvent::TextEnd {
                    content_index: index,
                    content,
                    partial,
                });
            }
            BlockKind::Thinking => {
                let content = self.partial.read(|message| match message.content.get(index) {
                    Some(ContentBlock::Thinking(thinking)) => thinking.thinking.clone(),
                    _ => String::new(),
                });
                self.emit(AssistantMessageEvent::ThinkingEnd {
                    content_index: index,
                    content,
                    partial,
                });
            }
            BlockKind::ToolCall => {
                let buffer = block.arguments;
                let tool_call = self.partial.update(|message| match message.content.get_mut(index) {
                    Some(ContentBlock::ToolCall(call)) => {
                        if !buffer.trim().is_empty() {
                            call.arguments = match serde_json::from_str::<Value>(&buffer) {
                                Ok(Value::Object(arguments)) => arguments,
                                _ => parse_partial_json(&buffer),
                            };
                        }
                        call.clone()
                    }
                    _ => ToolCall::default(),
                });
                self.emit(AssistantMessageEvent::ToolCallEnd {
                    content_index: index,
                    tool_call,
                    partial,
                });
            }
        }
    }

    /// Close the open block and open a new one of `kind`
    pub fn begin_block(&mut self, kind: BlockKind) -> usize {
        match kind {
            BlockKind::Text => self.open_block(kind, ContentBlock::text(""), None),
            BlockKind::Thinking => self.open_block(kind, ContentBlock::thinking(""), None),
            BlockKind::ToolCall => self.begin_tool_call("", ""),
        }
    }

    fn open_block(&mut self, kind: BlockKind, block: ContentBlock, tool_call_id: Option<String>) -> usize {
        if self.terminated {
            return self.partial.read(|message| message.content.len());
        }
        self.end_block();
        let index = self.partial.update(|message| {
            message.content.push(block);
            message.content.len() - 1
        });
        self.current = Some(OpenBlock {
            kind,
            index,
            tool_call_id,
            arguments: String::new(),
        });
        let partial = self.partial();
        let event = match kind {
            BlockKind::Text => AssistantMessageEvent::TextStart {
                content_index: index,
                partial,
            },
            BlockKind::Thinking => AssistantMessageEvent::ThinkingStart {
                content_index: index,
                partial,
            },
            BlockKind::ToolCall => AssistantMessageEvent::ToolCallStart {
                content_index: index,
                partial,
            },
        };
        self.emit(event);
        index
    }

    fn ensure_block(&mut self, kind: BlockKind) -> usize {
        match &self.current {
            Some(block) if block.kind == kind => block.index,
            _ => self.begin_block(kind),
        }
    }

    /// Append visible text
    pub fn text_delta(&mut self, delta: &str) {
        if self.terminated || delta.is_empty() {
            return;
        }
        let index = self.ensure_block(BlockKind::Text);
        self.mark_first_delta();
        self.partial.update(|message| {
            if let Some(ContentBlock::Text(text)) = message.content.get_mut(index) {
                text.text.push_str(delta);
            }
        });
        self.emit(AssistantMessageEvent::TextDelta {
            content_index: index,
            delta: delta.to_string(),
            partial: self.partial(),
        });
    }

    /// Append reasoning text
    pub fn thinking_delta(&mut self, delta: &str) {
        if self.terminated || delta.is_empty() {
            return;
        }
        let index = self.ensure_block(BlockKind::Thinking);
        self.mark_first_delta();
        self.partial.update(|message| {
            if let Some(ContentBlock::Thinking(thinking)) = message.content.get_mut(index) {
                thinking.thinking.push_str(delta);
            }
        });
        self.emit(AssistantMessageEvent::ThinkingDelta {
            content_index: index,
            delta: delta.to_string(),
            partial: self.partial(),
        });
    }

    fn with_current<R>(&self, kind: BlockKind, f: impl FnOnce(&mut ContentBlock) -> R) -> Option<R> {
        let block = self.current.as_ref().filter(|block| block.kind == kind)?;
        let index = block.index;
        self.partial.update(|message| message.content.get_mut(index).map(f))
    }

    /// Set the signature of the open text block
    pub fn set_text_signature(&mut self, signature: impl Into<String>) {
        let signature = signature.into();
        self.with_current(BlockKind::Text, |block| {
            if let ContentBlock::Text(text) = block {
                text.text_signature = Some(signature);
            }
        });
    }

    /// Set the signature of the open thinking block
    pub fn set_thinking_signature(&mut self, signature: impl Into<String>) {
        let signature = signature.into();
        self.with_current(BlockKind::Thinking, |block| {
            if let ContentBlock::Thinking(thinking) = block {
                thinking.thinking_signature = Some(signature);
            }
        });
    }

    /// Append to the signature of the open thinking block
    pub fn append_thinking_signature(&mut self, fragment: &str) {
        self.with_current(BlockKind::Thinking, |block| {
            if let ContentBlock::Thinking(thinking) = block {
                thinking
                    .thinking_signature
                    .get_or_insert_with(String::new)
                    .push_str(fragment);
            }
        });
    }

    /// Emit a complete redacted reasoning block
    pub fn redacted_thinking(&mut self, data: impl Into<String>) {
        if self.terminated {
            return;
        }
        let block = ContentBlock::Thinking(ThinkingContent {
            thinking: "[Reasoning redacted]".to_string(),
            thinking_signature: Some(data.into()),
            redacted: true,
        });
        self.open_block(BlockKind::Thinking, block, None);
        self.end_block();
    }

    /// Open a tool-call block
    pub fn begin_tool_call(&mut self, id: &str, name: &str) -> usize {
        self.open_block(
            BlockKind::ToolCall,
            ContentBlock::tool_call(id, name, Map::new()),
            Some(id.to_string()),
        )
    }

    /// Append a fragment of tool-call arguments
    ///
    /// A delta carrying an id different from the open tool call starts a new
    /// block; a delta without an id continues the open one.
    pub fn tool_call_delta(&mut self, id: Option<&str>, name: Option<&str>, fragment: &str) {
        if self.terminated {
            return;
        }
        let continues = match (&self.current, id) {
            (Some(block), None) => block.kind == BlockKind::ToolCall,
            (Some(block), Some(id)) => {
                block.kind == BlockKind::ToolCall && block.tool_call_id.as_deref() == Some(id)
            }
            (None, _) => false,
        };
        if !continues {
            self.begin_tool_call(id.unwrap_or_default(), name.unwrap_or_default());
        }

        let Some(block) = self.current.as_mut() else {
            return;
        };
        let index = block.index;
        block.arguments.push_str(fragment);
        let arguments = parse_partial_json(&block.arguments);
        self.partial.update(|message| {
            if let Some(ContentBlock::ToolCall(call)) = message.content.get_mut(index) {
                if let Some(name) = name.filter(|name| !name.is_empty()) {
                    if call.name.is_empty() {
                        call.name = name.to_string();
                    }
                }
                call.arguments = arguments;
            }
        });

        if fragment.is_empty() {
            return;
        }
        self.mark_first_delta();
        self.emit(AssistantMessageEvent::ToolCallDelta {
            content_index: index,
            delta: fragment.to_string(),
            partial: self.partial(),
        });
    }

    /// Update the id of the open tool call
    pub fn set_tool_call_id(&mut self, id: impl Into<String>) {
        let id = id.into();
        if let Some(block) = self.current.as_mut().filter(|b| b.kind == BlockKind::ToolCall) {
            block.tool_call_id = Some(id.clone());
        }
        self.with_current(BlockKind::ToolCall, |block| {
            if let ContentBlock::ToolCall(call) = block {
                call.id = id;
            }
        });
    }

    /// Attach a thought signature to the open tool call
    pub fn set_thought_signature(&mut self, signature: impl Into<String>) {
        let signature = signature.into();
        self.with_current(BlockKind::ToolCall, |block| {
            if let ContentBlock::ToolCall(call) = block {
                call.thought_signature = Some(signature);
            }
        });
    }

    /// Emit a tool call whose arguments arrived whole
    pub fn tool_call_complete(
        &mut self,
        id: &str,
        name: &str,
        arguments: Map<String, Value>,
        thought_signature: Option<String>,
    ) {
        self.begin_tool_call(id, name);
        if let Some(signature) = thought_signature {
            self.set_thought_signature(signature);
        }
        let serialized = Value::Object(arguments).to_string();
        self.tool_call_delta(Some(id), Some(name), &serialized);
        self.end_block();
    }

    /// Replace usage and recompute the cost
    pub fn set_usage(&mut self, usage: Usage) {
        self.update_usage(|current| *current = usage);
    }

    /// Mutate usage and recompute the cost
    pub fn update_usage(&mut self, f: impl FnOnce(&mut Usage)) {
        if self.terminated {
            return;
        }
        let model = Arc::clone(&self.model);
        self.partial.update(|message| {
            f(&mut message.usage);
            calculate_cost(&model, &mut message.usage);
        });
    }

    pub fn usage(&self) -> Usage {
        self.partial.read(|message| message.usage)
    }

    fn elapsed_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    /// Close the stream successfully
    ///
    /// `ToolUse` is only kept when content holds a tool call, and a plain
    /// stop with tool calls is reported as `ToolUse`.
    pub fn finish(&mut self, reason: StopReason) {
        if self.terminated {
            return;
        }
        self.end_block();
        let duration = self.elapsed_ms();
        let message = self.partial.update(|message| {
            let has_tool_calls = message.has_tool_calls();
            message.stop_reason = match reason {
                StopReason::ToolUse if !has_tool_calls => StopReason::Stop,
                StopReason::Stop if has_tool_calls => StopReason::ToolUse,
                other => other,
            };
            message.duration = Some(duration);
            message.clone()
        });
        debug!(
            provider = %message.provider,
            model = %message.model,
            stop_reason = ?message.stop_reason,
            blocks = message.content.len(),
            duration_ms = duration,
            "stream finished"
        );
        self.partial.finalize();
        let reason = message.stop_reason;
        self.emit(AssistantMessageEvent::Done {
            reason,
            message,
            partial: self.partial(),
        });
        self.terminated = true;
    }

    /// Close the stream with a failure, keeping partial content
    pub fn fail(&mut self, error: &ProviderError) {
        if self.terminated {
            return;
        }
        self.end_block();
        let duration = self.elapsed_ms();
        let reason = if error.is_aborted() {
            StopReason::Aborted
        } else {
            StopReason::Error
        };
        let message = self.partial.update(|message| {
            message.stop_reason = reason;
            message.error_message = Some(error.to_string());
            message.usage.cost = Cost::default();
            message.duration = Some(duration);
            message.clone()
        });
        debug!(
            provider = %message.provider,
            model = %message.model,
            stop_reason = ?reason,
            %error,
            "stream failed"
        );
        self.partial.finalize();
        self.emit(AssistantMessageEvent::Error {
            reason,
            error: message,
            partial: self.partial(),
        });
        self.terminated = true;
    }

    /// Kind of the open block
    pub fn open_block_kind(&self) -> Option<BlockKind> {
        self.current_kind()
    }
}
