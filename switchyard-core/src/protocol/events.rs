//! Canonical streaming events
//!
//! Every adapter emits the same vocabulary: one `Start`, block lifecycle
//! events keyed by their index in `AssistantMessage::content`, and exactly
//! one terminal `Done` or `Error`. Each event carries a [`PartialMessage`]
//! handle onto the shared accumulator.

use super::types::{AssistantMessage, StopReason, ToolCall};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

struct PartialInner {
    message: RwLock<AssistantMessage>,
    finalized: AtomicBool,
}

/// Shared handle onto the message being streamed
///
/// There is a single writer (the adapter task) and any number of readers.
/// Reads before [`PartialMessage::is_finalized`] reports `true` are
/// snapshots that may change on the next event.
#[derive(Clone)]
pub struct PartialMessage {
    inner: Arc<PartialInner>,
}

impl PartialMessage {
    pub fn new(message: AssistantMessage) -> Self {
        Self {
            inner: Arc::new(PartialInner {
                message: RwLock::new(message),
                finalized: AtomicBool::new(false),
            }),
        }
    }

    /// Clone of the current state
    pub fn snapshot(&self) -> AssistantMessage {
        self.read(Clone::clone)
    }

    /// Run `f` against the current state without cloning it
    pub fn read<R>(&self, f: impl FnOnce(&AssistantMessage) -> R) -> R {
        let guard = self
            .inner
            .message
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    /// True once the terminal event has fired
    pub fn is_finalized(&self) -> bool {
        self.inner.finalized.load(Ordering::Acquire)
    }

    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut AssistantMessage) -> R) -> R {
        debug_assert!(!self.is_finalized(), "partial message mutated after finalization");
        let mut guard = self
            .inner
            .message
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub(crate) fn finalize(&self) {
        self.inner.finalized.store(true, Ordering::Release);
    }

    /// Same allocation, used to check handle identity
    pub fn ptr_eq(&self, other: &PartialMessage) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for PartialMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.read(|message| {
            f.debug_struct("PartialMessage")
                .field("blocks", &message.content.len())
                .field("stop_reason", &message.stop_reason)
                .field("finalized", &self.is_finalized())
                .finish()
        })
    }
}

/// One notification in the canonical event stream
#[derive(Debug, Clone)]
pub enum AssistantMessageEvent {
    Start {
        partial: PartialMessage,
    },
    TextStart {
        content_index: usize,
        partial: PartialMessage,
    },
    TextDelta {
        content_index: usize,
        delta: String,
        partial: PartialMessage,
    },
    TextEnd {
        content_index: usize,
        content: String,
        partial: PartialMessage,
    },
    ThinkingStart {
        content_index: usize,
        partial: PartialMessage,
    },
    ThinkingDelta {
        content_index: usize,
        delta: String,
        partial: PartialMessage,
    },
    ThinkingEnd {
        content_index: usize,
        content: String,
        partial: PartialMessage,
    },
    ToolCallStart {
        content_index: usize,
        partial: PartialMessage,
    },
    ToolCallDelta {
        content_index: usize,
        delta: String,
        partial: PartialMessage,
    },
    ToolCallEnd {
        content_index: usize,
        tool_call: ToolCall,
        partial: PartialMessage,
    },
    /// Successful completion; `reason` is `Stop`, `Length` or `ToolUse`
    Done {
        reason: StopReason,
        message: AssistantMessage,
        partial: PartialMessage,
    },
    /// Failure; `reason` is `Error` or `Aborted`
    Error {
        reason: StopReason,
        error: AssistantMessage,
        partial: PartialMessage,
    },
}

impl AssistantMessageEvent {
    /// Wire-style name of the event
    pub fn kind(&self) -> &'static str {
        match self {
            AssistantMessageEvent::Start { .. } => "start",
            AssistantMessageEvent::TextStart { .. } => "text_start",
            AssistantMessageEvent::TextDelta { .. } => "text_delta",
            AssistantMessageEvent::TextEnd { .. } => "text_end",
            AssistantMessageEvent::ThinkingStart { .. } => "thinking_start",
            AssistantMessageEvent::ThinkingDelta { .. } => "thinking_delta",
            AssistantMessageEvent::ThinkingEnd { .. } => "thinking_end",
            AssistantMessageEvent::ToolCallStart { .. } => "toolcall_start",
            AssistantMessageEvent::ToolCallDelta { .. } => "toolcall_delta",
            AssistantMessageEvent::ToolCallEnd { .. } => "toolcall_end",
            AssistantMessageEvent::Done { .. } => "done",
            AssistantMessageEvent::Error { .. } => "error",
        }
    }

    /// Block index for block lifecycle events
    pub fn content_index(&self) -> Option<usize> {
        match self {
            AssistantMessageEvent::TextStart { content_index, .. }
            | AssistantMessageEvent::TextDelta { content_index, .. }
            | AssistantMessageEvent::TextEnd { content_index, .. }
            | AssistantMessageEvent::ThinkingStart { content_index, .. }
            | AssistantMessageEvent::ThinkingDelta { content_index, .. }
            | AssistantMessageEvent::ThinkingEnd { content_index, .. }
            | AssistantMessageEvent::ToolCallStart { content_index, .. }
            | AssistantMessageEvent::ToolCallDelta { content_index, .. }
            | AssistantMessageEvent::ToolCallEnd { content_index, .. } => Some(*content_index),
            AssistantMessageEvent::Start { .. }
            | AssistantMessageEvent::Done { .. }
            | AssistantMessageEvent::Error { .. } => None,
        }
    }

    pub fn partial(&self) -> &PartialMessage {
        match self {
            AssistantMessageEvent::Start { partial }
            | AssistantMessageEvent::TextStart { partial, .. }
            | AssistantMessageEvent::TextDelta { partial, .. }
            | AssistantMessageEvent::TextEnd { partial, .. }
            | AssistantMessageEvent::ThinkingStart { partial, .. }
            | AssistantMessageEvent::ThinkingDelta { partial, .. }
            | AssistantMessageEvent::ThinkingEnd { partial, .. }
            | AssistantMessageEvent::ToolCallStart { partial, .. }
            | AssistantMessageEvent::ToolCallDelta { partial, .. }
            | AssistantMessageEvent::ToolCallEnd { partial, .. }
            | AssistantMessageEvent::Done { partial, .. }
            | AssistantMessageEvent::Error { partial, .. } => partial,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AssistantMessageEvent::Done { .. } | AssistantMessageEvent::Error { .. }
        )
    }

    /// Final message carried by a terminal event
    pub fn terminal_message(&self) -> Option<&AssistantMessage> {
        match self {
            AssistantMessageEvent::Done { message, .. } => Some(message),
            AssistantMessageEvent::Error { error, .. } => Some(error),
            _ => None,
        }
    }
}
