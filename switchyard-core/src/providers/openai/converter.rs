//! Conversion from the canonical context to chat-completions format

use super::types::*;
use super::data_url;
use crate::protocol::{
    AssistantMessage, ContentBlock, MaxTokensField, Message, Model, Tool, ToolResultMessage, UserContent,
    UserContentBlock,
};
use crate::providers::adapter::AdapterRequest;
use crate::providers::options::openai_completions_tool_choice;
use serde_json::Value;

/// Text sent in place of a tool result that only carried images
const IMAGE_ONLY_RESULT: &str = "(see attached image)";

fn supports_developer_role(model: &Model) -> bool {
    model
        .compat
        .as_ref()
        .and_then(|c| c.supports_developer_role)
        .unwrap_or_else(|| !matches!(model.provider.as_str(), "cerebras" | "xai" | "mistral" | "zai" | "groq"))
}

fn max_tokens_field(model: &Model) -> MaxTokensField {
    model
        .compat
        .as_ref()
        .and_then(|c| c.max_tokens_field)
        .unwrap_or(match model.provider.as_str() {
            "mistral" => MaxTokensField::MaxTokens,
            _ => MaxTokensField::MaxCompletionTokens,
        })
}

/// Build the request body
pub fn to_chat_request(request: &AdapterRequest) -> ChatCompletionRequest {
    let model = &request.model;
    let options = &request.options;
    let compat = model.compat();

    let (max_completion_tokens, max_tokens) = match max_tokens_field(model) {
        MaxTokensField::MaxCompletionTokens => (options.max_tokens, None),
        MaxTokensField::MaxTokens => (None, options.max_tokens),
    };
    let tools = request.context.tools();

    ChatCompletionRequest {
        model: model.id.clone(),
        messages: to_chat_messages(model, request.context.system_prompt.as_deref(), &request.context.messages),
        stream: true,
        stream_options: compat
            .supports_usage_in_streaming
            .unwrap_or(true)
            .then_some(ChatStreamOptions { include_usage: true }),
        temperature: options.temperature,
        max_completion_tokens,
        max_tokens,
        tools: (!tools.is_empty()).then(|| tools.iter().map(to_chat_tool).collect()),
        tool_choice: options
            .tool_choice
            .as_ref()
            .filter(|_| !tools.is_empty())
            .map(openai_completions_tool_choice),
        reasoning_effort: request.vendor.reasoning_effort().map(str::to_string),
    }
}

fn to_chat_tool(tool: &Tool) -> ChatTool {
    ChatTool {
        tool_type: "function".to_string(),
        function: ChatFunction {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.parameters.clone(),
        },
    }
}

/// Convert the history, system prompt first
pub fn to_chat_messages(model: &Model, system_prompt: Option<&str>, messages: &[Message]) -> Vec<ChatMessage> {
    let mut out = Vec::with_capacity(messages.len() + 1);

    if let Some(prompt) = system_prompt.filter(|p| !p.is_empty()) {
        let role = if model.reasoning && supports_developer_role(model) {
            "developer"
        } else {
            "system"
        };
        out.push(ChatMessage::new(role, Some(ChatContent::Text(prompt.to_string()))));
    }

    let mut index = 0;
    while index < messages.len() {
        match &messages[index] {
            Message::User(user) => {
                if let Some(message) = user_message(model, &user.content) {
                    out.push(message);
                }
                index += 1;
            }
            Message::Assistant(assistant) => {
                if let Some(message) = assistant_message(assistant) {
                    out.push(message);
                }
                index += 1;
            }
            Message::ToolResult(_) => {
                // Images from a run of tool results follow as one user message.
                let mut images = Vec::new();
                while let Some(Message::ToolResult(result)) = messages.get(index) {
                    out.push(tool_message(result));
                    if model.supports_images() {
                        images.extend(result.images().map(|image| ChatContentPart::ImageUrl {
                            image_url: ChatImageUrl { url: data_url(image) },
                        }));
                    }
                    index += 1;
                }
                if !images.is_empty() {
                    let mut parts = vec![ChatContentPart::Text {
                        text: "Attached image(s) from tool result:".to_string(),
                    }];
                    parts.extend(images);
                    out.push(ChatMessage::new("user", Some(ChatContent::Parts(parts))));
                }
            }
        }
    }

    out
}

fn user_message(model: &Model, content: &UserContent) -> Option<ChatMessage> {
    match content {
        UserContent::Text(text) => Some(ChatMessage::new("user", Some(ChatContent::Text(text.clone())))),
        UserContent::Parts(parts) => {
            let parts: Vec<ChatContentPart> = parts
                .iter()
                .filter_map(|part| match part {
                    UserContentBlock::Text(text) => Some(ChatContentPart::Text {
                        text: text.text.clone(),
                    }),
                    UserContentBlock::Image(image) if model.supports_images() => Some(ChatContentPart::ImageUrl {
                        image_url: ChatImageUrl { url: data_url(image) },
                    }),
                    UserContentBlock::Image(_) => None,
                })
                .collect();
            (!parts.is_empty()).then(|| ChatMessage::new("user", Some(ChatContent::Parts(parts))))
        }
    }
}

fn assistant_message(assistant: &AssistantMessage) -> Option<ChatMessage> {
    let mut text = String::new();
    let mut tool_calls = Vec::new();
    let mut message = ChatMessage::new("assistant", None);

    for block in &assistant.content {
        match block {
            ContentBlock::Text(block) => text.push_str(&block.text),
            ContentBlock::Thinking(thinking) => {
                let field = thinking
                    .thinking_signature
                    .as_deref()
                    .filter(|sig| REASONING_FIELDS.contains(sig));
                if let Some(field) = field {
                    let entry = message
                        .reasoning
                        .entry(field.to_string())
                        .or_insert_with(|| Value::String(String::new()));
                    if let Value::String(existing) = entry {
                        existing.push_str(&thinking.thinking);
                    }
                }
            }
            ContentBlock::ToolCall(call) => tool_calls.push(ChatToolCall {
                id: call.id.clone(),
                tool_type: "function".to_string(),
                function: ChatFunctionCall {
                    name: call.name.clone(),
                    arguments: Value::Object(call.arguments.clone()).to_string(),
                },
            }),
        }
    }

    if text.is_empty() && tool_calls.is_empty() {
        return None;
    }
    if !text.is_empty() {
        message.content = Some(ChatContent::Text(text));
    }
    if !tool_calls.is_empty() {
        message.tool_calls = Some(tool_calls);
    }
    Some(message)
}

fn tool_message(result: &ToolResultMessage) -> ChatMessage {
    let mut text = result.text_content();
    if text.is_empty() && result.images().next().is_some() {
        text = IMAGE_ONLY_RESULT.to_string();
    }
    let mut message = ChatMessage::new("tool", Some(ChatContent::Text(text)));
    message.tool_call_id = Some(result.tool_call_id.clone());
    message
}
