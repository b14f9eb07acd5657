//! Core conversation types shared by every adapter
//!
//! This module contains the vendor-neutral data model: the request
//! [`Context`], the three message kinds, assistant content blocks and the
//! stop reason. The design prioritizes:
//! - Type safety through closed tagged unions
//! - Lossless round-tripping of vendor signatures
//! - Serialization that persistence layers can store as-is

use super::model::Api;
use super::usage::Usage;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Milliseconds since the Unix epoch, the timestamp unit used throughout.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Immutable input of a single request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    /// Optional system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Conversation history, oldest first
    #[serde(default)]
    pub messages: Vec<Message>,

    /// Tools the model may call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
}

impl Context {
    /// Create a context from a message history
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            system_prompt: None,
            messages,
            tools: None,
        }
    }

    /// Set the system prompt
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Set the tool declarations
    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Tool declarations, empty when none were given
    pub fn tools(&self) -> &[Tool] {
        self.tools.as_deref().unwrap_or_default()
    }
}

/// Tool declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    /// Tool name as the model sees it
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// Parameters schema (JSON Schema)
    pub parameters: Value,
}

impl Tool {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "camelCase")]
pub enum Message {
    /// Input from the user
    User(UserMessage),
    /// Output produced by a model
    Assistant(AssistantMessage),
    /// Result of executing a tool call
    ToolResult(ToolResultMessage),
}

impl Message {
    /// Create a user message with plain text content
    pub fn user(text: impl Into<String>) -> Self {
        Message::User(UserMessage::text(text))
    }

    /// Create a successful tool result with text content
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Message::ToolResult(ToolResultMessage::text(tool_call_id, tool_name, text, false))
    }

    /// Message timestamp in milliseconds
    pub fn timestamp(&self) -> i64 {
        match self {
            Message::User(m) => m.timestamp,
            Message::Assistant(m) => m.timestamp,
            Message::ToolResult(m) => m.timestamp,
        }
    }
}

impl From<UserMessage> for Message {
    fn from(message: UserMessage) -> Self {
        Message::User(message)
    }
}

impl From<AssistantMessage> for Message {
    fn from(message: AssistantMessage) -> Self {
        Message::Assistant(message)
    }
}

impl From<ToolResultMessage> for Message {
    fn from(message: ToolResultMessage) -> Self {
        Message::ToolResult(message)
    }
}

/// User message content: plain text or a list of text/image parts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserContent {
    /// Plain text content
    Text(String),
    /// Structured content parts
    Parts(Vec<UserContentBlock>),
}

impl UserContent {
    /// Concatenated text of all text parts
    pub fn text(&self) -> String {
        match self {
            UserContent::Text(text) => text.clone(),
            UserContent::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    UserContentBlock::Text(text) => Some(text.text.as_str()),
                    UserContentBlock::Image(_) => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Content as a list of parts
    pub fn parts(&self) -> Vec<UserContentBlock> {
        match self {
            UserContent::Text(text) => vec![UserContentBlock::Text(TextPart { text: text.clone() })],
            UserContent::Parts(parts) => parts.clone(),
        }
    }
}

/// Text or image part, used by user messages and tool results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum UserContentBlock {
    Text(TextPart),
    Image(ImageContent),
}

impl UserContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        UserContentBlock::Text(TextPart { text: text.into() })
    }

    pub fn image(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        UserContentBlock::Image(ImageContent {
            data: data.into(),
            mime_type: mime_type.into(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPart {
    pub text: String,
}

/// Inline image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageContent {
    /// Base64-encoded image bytes
    pub data: String,

    /// MIME type, e.g. `image/png`
    pub mime_type: String,
}

/// Input from the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMessage {
    pub content: UserContent,
    pub timestamp: i64,
}

impl UserMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: UserContent::Text(text.into()),
            timestamp: now_millis(),
        }
    }

    pub fn parts(parts: Vec<UserContentBlock>) -> Self {
        Self {
            content: UserContent::Parts(parts),
            timestamp: now_millis(),
        }
    }
}

/// Why generation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    /// Natural end of turn
    Stop,
    /// Output token limit reached
    Length,
    /// The model wants tool results
    ToolUse,
    /// The request failed
    Error,
    /// The caller cancelled the request
    Aborted,
}

impl StopReason {
    /// Whether this reason ends a request as a failure
    pub fn is_failure(&self) -> bool {
        matches!(self, StopReason::Error | StopReason::Aborted)
    }
}

/// Output produced by a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantMessage {
    /// Content blocks in conversation order
    pub content: Vec<ContentBlock>,

    /// Wire protocol that produced this message
    pub api: Api,

    /// Vendor that served the request
    pub provider: String,

    /// Model identifier
    pub model: String,

    pub usage: Usage,

    pub stop_reason: StopReason,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    pub timestamp: i64,

    /// Milliseconds from request start to the terminal event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,

    /// Milliseconds from request start to the first content delta
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttft: Option<u64>,
}

impl AssistantMessage {
    /// Create an empty accumulator for a request
    pub fn empty(api: Api, provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            content: Vec::new(),
            api,
            provider: provider.into(),
            model: model.into(),
            usage: Usage::default(),
            stop_reason: StopReason::Stop,
            error_message: None,
            timestamp: now_millis(),
            duration: None,
            ttft: None,
        }
    }

    /// Tool calls in content order
    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCall> {
        self.content.iter().filter_map(|block| match block {
            ContentBlock::ToolCall(call) => Some(call),
            _ => None,
        })
    }

    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls().next().is_some()
    }

    /// Concatenated text of all text blocks
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text(text) => Some(text.text.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// One contiguous unit of assistant output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ContentBlock {
    Text(TextContent),
    Thinking(ThinkingContent),
    ToolCall(ToolCall),
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text(TextContent {
            text: text.into(),
            text_signature: None,
        })
    }

    pub fn thinking(thinking: impl Into<String>) -> Self {
        ContentBlock::Thinking(ThinkingContent {
            thinking: thinking.into(),
            thinking_signature: None,
            redacted: false,
        })
    }

    pub fn tool_call(id: impl Into<String>, name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        ContentBlock::ToolCall(ToolCall {
            id: id.into(),
            name: name.into(),
            arguments,
            thought_signature: None,
        })
    }
}

/// Text output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextContent {
    pub text: String,

    /// Vendor-issued opaque marker for this text (message id, thought signature)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_signature: Option<String>,
}

/// Reasoning output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingContent {
    pub thinking: String,

    /// Opaque token needed by some vendors to resume reasoning context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_signature: Option<String>,

    /// The vendor redacted the reasoning; the payload lives in the signature
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub redacted: bool,
}

/// Tool invocation requested by the model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought_signature: Option<String>,
}

/// Result of executing a tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultMessage {
    pub tool_call_id: String,
    pub tool_name: String,
    pub content: Vec<UserContentBlock>,
    pub is_error: bool,
    pub timestamp: i64,
}

impl ToolResultMessage {
    pub fn text(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        text: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            content: vec![UserContentBlock::text(text)],
            is_error,
            timestamp: now_millis(),
        }
    }

    /// Concatenated text of all text parts
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                UserContentBlock::Text(text) => Some(text.text.as_str()),
                UserContentBlock::Image(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn images(&self) -> impl Iterator<Item = &ImageContent> {
        self.content.iter().filter_map(|part| match part {
            UserContentBlock::Image(image) => Some(image),
            UserContentBlock::Text(_) => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_role_tagging() {
        let message = Message::user("hello");
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["role"], "user");
        assert_eq!(value["content"], "hello");

        let result = Message::tool_result("call_1", "read", "ok");
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["role"], "toolResult");
        assert_eq!(value["toolCallId"], "call_1");
    }

    #[test]
    fn test_assistant_round_trip() {
        let mut message = AssistantMessage::empty(Api::AnthropicMessages, "anthropic", "claude-sonnet-4-5");
        message.content.push(ContentBlock::thinking("plan"));
        message.content.push(ContentBlock::text("done"));
        let mut arguments = Map::new();
        arguments.insert("path".to_string(), json!("src/lib.rs"));
        message.content.push(ContentBlock::tool_call("toolu_1", "read", arguments));
        message.stop_reason = StopReason::ToolUse;

        let encoded = serde_json::to_string(&Message::Assistant(message.clone())).unwrap();
        let decoded: Message = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, Message::Assistant(message));
        assert!(encoded.contains("\"stopReason\":\"toolUse\""));
        assert!(encoded.contains("\"api\":\"anthropic-messages\""));
    }

    #[test]
    fn test_user_content_text_joins_parts() {
        let content = UserContent::Parts(vec![
            UserContentBlock::text("a"),
            UserContentBlock::image("AAAA", "image/png"),
            UserContentBlock::text("b"),
        ]);
        assert_eq!(content.text(), "a\nb");
    }
}
