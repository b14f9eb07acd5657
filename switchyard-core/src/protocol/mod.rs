//! Protocol module for the vendor-neutral data model
//!
//! This module defines the canonical structures every adapter reads and
//! writes. These structures are designed to be:
//! - Provider-agnostic
//! - Streaming-first, with a shared partial message per request
//! - Lossless for vendor signatures across turns
//! - Type-safe and serializable

pub mod events;
pub mod model;
pub mod options;
pub mod types;
pub mod usage;

pub use events::{AssistantMessageEvent, PartialMessage};
pub use model::{Api, InputModality, MaxTokensField, Model, ModelCompat, ModelCost, UnsupportedApi};
pub use options::{
    CacheRetention, PayloadHook, SimpleStreamOptions, StreamOptions, ThinkingBudgets,
    ThinkingLevel, ToolChoice,
};
pub use types::{
    now_millis, AssistantMessage, ContentBlock, Context, ImageContent, Message, StopReason,
    TextContent, TextPart, ThinkingContent, Tool, ToolCall, ToolResultMessage, UserContent,
    UserContentBlock, UserMessage,
};
pub use usage::{calculate_cost, Cost, Usage};
