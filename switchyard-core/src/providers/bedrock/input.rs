//! Request conversion for the Bedrock Converse API
//!
//! The body is first rendered in Converse's JSON wire shape (which is what the
//! payload hook sees) and then lowered into SDK types.

use crate::protocol::{
    AssistantMessage, CacheRetention, ContentBlock as Block, ImageContent, Message, Model, Tool, ToolChoice as Choice,
    ToolResultMessage, UserContentBlock,
};
use crate::providers::adapter::AdapterRequest;
use crate::providers::error::{ProviderError, ProviderResult};
use crate::providers::options::ThinkingConfig;
use aws_sdk_bedrockruntime::types::{
    AnyToolChoice, AutoToolChoice, CachePointBlock, CachePointType, ContentBlock, ConversationRole, ImageBlock,
    ImageFormat, ImageSource, InferenceConfiguration, Message as BedrockMessage, ReasoningContentBlock,
    ReasoningTextBlock, SpecificToolChoice, SystemContentBlock, Tool as BedrockTool, ToolChoice, ToolConfiguration,
    ToolInputSchema, ToolResultBlock, ToolResultContentBlock, ToolResultStatus, ToolSpecification, ToolUseBlock,
};
use aws_smithy_types::error::operation::BuildError;
use aws_smithy_types::{Blob, Document, Number};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Map, Value};

const INTERLEAVED_THINKING_BETA: &str = "interleaved-thinking-2025-05-14";

/// Converse input lowered into SDK types
#[derive(Debug, Default)]
pub struct ConverseParts {
    pub messages: Vec<BedrockMessage>,
    pub system: Option<Vec<SystemContentBlock>>,
    pub inference_config: Option<InferenceConfiguration>,
    pub tool_config: Option<ToolConfiguration>,
    pub additional_fields: Option<Document>,
}

fn build_error(error: BuildError) -> ProviderError {
    ProviderError::Configuration(format!("Invalid Bedrock request: {error}"))
}

fn is_claude(model: &Model) -> bool {
    model.id.to_lowercase().contains("claude")
}

fn image_format(mime_type: &str) -> &str {
    mime_type.strip_prefix("image/").unwrap_or(mime_type)
}

fn image_json(image: &ImageContent) -> Value {
    json!({"image": {"format": image_format(&image.mime_type), "source": {"bytes": image.data}}})
}

fn user_content(parts: &[UserContentBlock], images: bool) -> Vec<Value> {
    parts
        .iter()
        .filter_map(|part| match part {
            UserContentBlock::Text(text) if text.text.trim().is_empty() => None,
            UserContentBlock::Text(text) => Some(json!({"text": text.text})),
            UserContentBlock::Image(image) if images => Some(image_json(image)),
            UserContentBlock::Image(_) => None,
        })
        .collect()
}

fn assistant_content(assistant: &AssistantMessage) -> Vec<Value> {
    assistant
        .content
        .iter()
        .filter_map(|block| match block {
            Block::Text(text) if text.text.trim().is_empty() => None,
            Block::Text(text) => Some(json!({"text": text.text})),
            Block::Thinking(thinking) if thinking.redacted => thinking
                .thinking_signature
                .as_ref()
                .map(|data| json!({"reasoningContent": {"redactedContent": data}})),
            Block::Thinking(thinking) if thinking.thinking.trim().is_empty() => None,
            Block::Thinking(thinking) => Some(match thinking.thinking_signature.as_deref() {
                Some(signature) if !signature.is_empty() => json!({"reasoningContent": {
                    "reasoningText": {"text": thinking.thinking, "signature": signature}
                }}),
                _ => json!({"text": thinking.thinking}),
            }),
            Block::ToolCall(call) => Some(json!({"toolUse": {
                "toolUseId": call.id,
                "name": call.name,
                "input": Value::Object(call.arguments.clone()),
            }})),
        })
        .collect()
}

fn tool_result_json(result: &ToolResultMessage, images: bool) -> Value {
    let mut content: Vec<Value> = result
        .content
        .iter()
        .filter_map(|part| match part {
            UserContentBlock::Text(text) => Some(json!({"text": text.text})),
            UserContentBlock::Image(image) if images => Some(image_json(image)),
            UserContentBlock::Image(_) => None,
        })
        .collect();
    if content.is_empty() {
        content.push(json!({"text": ""}));
    }
    json!({"toolResult": {
        "toolUseId": result.tool_call_id,
        "content": content,
        "status": if result.is_error { "error" } else { "success" },
    }})
}

/// Render the history as Converse `messages`
pub fn messages_json(messages: &[Message], model: &Model) -> Vec<Value> {
    let images = model.supports_images();
    let mut out = Vec::with_capacity(messages.len());
    let mut index = 0;

    while index < messages.len() {
        match &messages[index] {
            Message::User(user) => {
                let content = user_content(&user.content.parts(), images);
                if !content.is_empty() {
                    out.push(json!({"role": "user", "content": content}));
                }
                index += 1;
            }
            Message::Assistant(assistant) => {
                let content = assistant_content(assistant);
                if !content.is_empty() {
                    out.push(json!({"role": "assistant", "content": content}));
                }
                index += 1;
            }
            Message::ToolResult(_) => {
                let mut content = Vec::new();
                while let Some(Message::ToolResult(result)) = messages.get(index) {
                    content.push(tool_result_json(result, images));
                    index += 1;
                }
                out.push(json!({"role": "user", "content": content}));
            }
        }
    }

    out
}

fn tool_choice_json(choice: &Choice) -> Option<Value> {
    match choice {
        Choice::Auto => Some(json!({"auto": {}})),
        Choice::Required => Some(json!({"any": {}})),
        Choice::Tool(name) => Some(json!({"tool": {"name": name}})),
        // Converse has no "none"; tools stay declared for history replay.
        Choice::None => None,
    }
}

fn tool_json(tool: &Tool) -> Value {
    json!({"toolSpec": {
        "name": tool.name,
        "description": tool.description,
        "inputSchema": {"json": tool.parameters},
    }})
}

/// Build the Converse request in its JSON wire shape
pub fn build_body(request: &AdapterRequest) -> Value {
    let model = &request.model;
    let options = &request.options;
    let cache = is_claude(model) && options.cache_retention() != CacheRetention::None;
    let thinking = request.vendor.claude_thinking();
    let tools = request.context.tools();

    let mut body = Map::new();
    body.insert("modelId".into(), json!(model.id));

    let mut messages = messages_json(&request.context.messages, model);
    if cache {
        if let Some(content) = messages
            .iter_mut()
            .rev()
            .find(|message| message["role"] == "user")
            .and_then(|message| message["content"].as_array_mut())
        {
            content.push(json!({"cachePoint": {"type": "default"}}));
        }
    }
    body.insert("messages".into(), Value::Array(messages));

    if let Some(prompt) = request.context.system_prompt.as_deref().filter(|p| !p.is_empty()) {
        let mut system = vec![json!({"text": prompt})];
        if cache {
            system.push(json!({"cachePoint": {"type": "default"}}));
        }
        body.insert("system".into(), Value::Array(system));
    }

    let mut inference = Map::new();
    inference.insert("maxTokens".into(), json!(options.max_tokens.unwrap_or(model.max_tokens)));
    if let (ThinkingConfig::Disabled, Some(temperature)) = (thinking, options.temperature) {
        inference.insert("temperature".into(), json!(temperature));
    }
    body.insert("inferenceConfig".into(), Value::Object(inference));

    if !tools.is_empty() {
        let mut tool_config = Map::new();
        tool_config.insert("tools".into(), Value::Array(tools.iter().map(tool_json).collect()));
        if let Some(choice) = options.tool_choice.as_ref().and_then(tool_choice_json) {
            tool_config.insert("toolChoice".into(), choice);
        }
        body.insert("toolConfig".into(), Value::Object(tool_config));
    }

    if let ThinkingConfig::Enabled { budget_tokens } = thinking {
        body.insert(
            "additionalModelRequestFields".into(),
            json!({
                "thinking": {"type": "enabled", "budget_tokens": budget_tokens},
                "anthropic_beta": [INTERLEAVED_THINKING_BETA],
            }),
        );
    }

    Value::Object(body)
}

/// Convert JSON into a smithy `Document`
pub fn json_to_document(value: &Value) -> Document {
    match value {
        Value::Null => Document::Null,
        Value::Bool(b) => Document::Bool(*b),
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                Document::Number(Number::PosInt(u))
            } else if let Some(i) = n.as_i64() {
                Document::Number(Number::NegInt(i))
            } else {
                Document::Number(Number::Float(n.as_f64().unwrap_or_default()))
            }
        }
        Value::String(s) => Document::String(s.clone()),
        Value::Array(items) => Document::Array(items.iter().map(json_to_document).collect()),
        Value::Object(map) => Document::Object(map.iter().map(|(k, v)| (k.clone(), json_to_document(v))).collect()),
    }
}

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn decode_base64(data: &str) -> ProviderResult<Blob> {
    BASE64
        .decode(data)
        .map(Blob::new)
        .map_err(|e| ProviderError::Configuration(format!("Invalid base64 payload: {e}")))
}

fn image_block(image: &Value) -> ProviderResult<ImageBlock> {
    let bytes = decode_base64(str_field(&image["source"], "bytes"))?;
    ImageBlock::builder()
        .format(ImageFormat::from(str_field(image, "format")))
        .source(ImageSource::Bytes(bytes))
        .build()
        .map_err(build_error)
}

fn cache_point() -> ProviderResult<CachePointBlock> {
    CachePointBlock::builder()
        .r#type(CachePointType::Default)
        .build()
        .map_err(build_error)
}

fn tool_result_block(result: &Value) -> ProviderResult<ToolResultBlock> {
    let content = result["content"]
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .map(|item| match item.get("image") {
            Some(image) => image_block(image).map(ToolResultContentBlock::Image),
            None => Ok(ToolResultContentBlock::Text(str_field(item, "text").to_string())),
        })
        .collect::<ProviderResult<Vec<_>>>()?;
    let status = match str_field(result, "status") {
        "error" => ToolResultStatus::Error,
        _ => ToolResultStatus::Success,
    };
    ToolResultBlock::builder()
        .tool_use_id(str_field(result, "toolUseId"))
        .set_content(Some(content))
        .status(status)
        .build()
        .map_err(build_error)
}

fn reasoning_block(reasoning: &Value) -> ProviderResult<ReasoningContentBlock> {
    if let Some(data) = reasoning.get("redactedContent").and_then(Value::as_str) {
        return Ok(ReasoningContentBlock::RedactedContent(decode_base64(data)?));
    }
    let text = &reasoning["reasoningText"];
    let mut builder = ReasoningTextBlock::builder().text(str_field(text, "text"));
    if let Some(signature) = text.get("signature").and_then(Value::as_str) {
        builder = builder.signature(signature);
    }
    builder
        .build()
        .map(ReasoningContentBlock::ReasoningText)
        .map_err(build_error)
}

fn content_block(value: &Value) -> ProviderResult<ContentBlock> {
    if let Some(text) = value.get("text").and_then(Value::as_str) {
        return Ok(ContentBlock::Text(text.to_string()));
    }
    if let Some(image) = value.get("image") {
        return image_block(image).map(ContentBlock::Image);
    }
    if let Some(tool_use) = value.get("toolUse") {
        return ToolUseBlock::builder()
            .tool_use_id(str_field(tool_use, "toolUseId"))
            .name(str_field(tool_use, "name"))
            .input(json_to_document(&tool_use["input"]))
            .build()
            .map(ContentBlock::ToolUse)
            .map_err(build_error);
    }
    if let Some(result) = value.get("toolResult") {
        return tool_result_block(result).map(ContentBlock::ToolResult);
    }
    if let Some(reasoning) = value.get("reasoningContent") {
        return reasoning_block(reasoning).map(ContentBlock::ReasoningContent);
    }
    if value.get("cachePoint").is_some() {
        return cache_point().map(ContentBlock::CachePoint);
    }
    Err(ProviderError::Configuration(format!("Unsupported Bedrock content block: {value}")))
}

fn message(value: &Value) -> ProviderResult<BedrockMessage> {
    let role = match str_field(value, "role") {
        "assistant" => ConversationRole::Assistant,
        _ => ConversationRole::User,
    };
    let content = value["content"]
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .map(content_block)
        .collect::<ProviderResult<Vec<_>>>()?;
    BedrockMessage::builder()
        .role(role)
        .set_content(Some(content))
        .build()
        .map_err(build_error)
}

fn tool_config(value: &Value) -> ProviderResult<ToolConfiguration> {
    let tools = value["tools"]
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .map(|tool| {
            let spec = &tool["toolSpec"];
            ToolSpecification::builder()
                .name(str_field(spec, "name"))
                .description(str_field(spec, "description"))
                .input_schema(ToolInputSchema::Json(json_to_document(&spec["inputSchema"]["json"])))
                .build()
                .map(BedrockTool::ToolSpec)
                .map_err(build_error)
        })
        .collect::<ProviderResult<Vec<_>>>()?;

    let mut builder = ToolConfiguration::builder().set_tools(Some(tools));
    if let Some(choice) = value.get("toolChoice") {
        let choice = if choice.get("any").is_some() {
            ToolChoice::Any(AnyToolChoice::builder().build())
        } else if let Some(tool) = choice.get("tool") {
            SpecificToolChoice::builder()
                .name(str_field(tool, "name"))
                .build()
                .map(ToolChoice::Tool)
                .map_err(build_error)?
        } else {
            ToolChoice::Auto(AutoToolChoice::builder().build())
        };
        builder = builder.tool_choice(choice);
    }
    builder.build().map_err(build_error)
}

/// Lower the JSON body into SDK types
pub fn to_converse_parts(body: &Value) -> ProviderResult<ConverseParts> {
    let messages = body["messages"]
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .map(message)
        .collect::<ProviderResult<Vec<_>>>()?;

    let system = body["system"]
        .as_array()
        .map(|blocks| {
            blocks
                .iter()
                .map(|block| match block.get("text").and_then(Value::as_str) {
                    Some(text) => Ok(SystemContentBlock::Text(text.to_string())),
                    None => cache_point().map(SystemContentBlock::CachePoint),
                })
                .collect::<ProviderResult<Vec<_>>>()
        })
        .transpose()?;

    let inference_config = body.get("inferenceConfig").map(|config| {
        let mut builder = InferenceConfiguration::builder();
        if let Some(max_tokens) = config.get("maxTokens").and_then(Value::as_u64) {
            builder = builder.max_tokens(i32::try_from(max_tokens).unwrap_or(i32::MAX));
        }
        if let Some(temperature) = config.get("temperature").and_then(Value::as_f64) {
            builder = builder.temperature(temperature as f32);
        }
        builder.build()
    });

    let tool_config = body.get("toolConfig").map(tool_config).transpose()?;
    let additional_fields = body.get("additionalModelRequestFields").map(json_to_document);

    Ok(ConverseParts {
        messages,
        system,
        inference_config,
        tool_config,
        additional_fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Api, ThinkingContent, ToolCall};

    fn claude() -> Model {
        Model::new("us.anthropic.claude-sonnet-4-5", Api::BedrockConverseStream, "amazon-bedrock", "")
    }

    #[test]
    fn test_assistant_reasoning_and_tool_use() {
        let mut assistant = AssistantMessage::empty(Api::BedrockConverseStream, "amazon-bedrock", "m");
        assistant.content.push(Block::Thinking(ThinkingContent {
            thinking: "step".into(),
            thinking_signature: Some("sig".into()),
            redacted: false,
        }));
        assistant.content.push(Block::ToolCall(ToolCall {
            id: "tooluse_1".into(),
            name: "read".into(),
            ..Default::default()
        }));
        let messages = vec![
            Message::user("go"),
            Message::Assistant(assistant),
            Message::tool_result("tooluse_1", "read", "data"),
        ];

        let json = messages_json(&messages, &claude());
        assert_eq!(json[1]["content"][0]["reasoningContent"]["reasoningText"]["signature"], "sig");
        assert_eq!(json[1]["content"][1]["toolUse"]["toolUseId"], "tooluse_1");
        assert_eq!(json[2]["content"][0]["toolResult"]["status"], "success");

        let body = json!({"messages": json});
        let parts = to_converse_parts(&body).unwrap();
        assert_eq!(parts.messages.len(), 3);
        assert_eq!(parts.messages[1].role(), &ConversationRole::Assistant);
        assert!(matches!(parts.messages[1].content()[0], ContentBlock::ReasoningContent(_)));
        assert!(matches!(parts.messages[2].content()[0], ContentBlock::ToolResult(_)));
    }

    #[test]
    fn test_system_cache_point_and_config() {
        let body = json!({
            "messages": [{"role": "user", "content": [{"text": "hi"}, {"cachePoint": {"type": "default"}}]}],
            "system": [{"text": "be brief"}, {"cachePoint": {"type": "default"}}],
            "inferenceConfig": {"maxTokens": 4096, "temperature": 0.5},
            "toolConfig": {
                "tools": [{"toolSpec": {"name": "ls", "description": "list", "inputSchema": {"json": {"type": "object"}}}}],
                "toolChoice": {"tool": {"name": "ls"}}
            },
            "additionalModelRequestFields": {"thinking": {"type": "enabled", "budget_tokens": 2048}}
        });
        let parts = to_converse_parts(&body).unwrap();
        let system = parts.system.unwrap();
        assert!(matches!(system[1], SystemContentBlock::CachePoint(_)));
        assert_eq!(parts.inference_config.unwrap().max_tokens(), Some(4096));
        assert!(matches!(parts.tool_config.unwrap().tool_choice(), Some(ToolChoice::Tool(_))));
        assert!(matches!(parts.additional_fields, Some(Document::Object(_))));
    }

    #[test]
    fn test_json_to_document_numbers() {
        assert_eq!(json_to_document(&json!(3)), Document::Number(Number::PosInt(3)));
        assert_eq!(json_to_document(&json!(-3)), Document::Number(Number::NegInt(-3)));
        assert_eq!(json_to_document(&json!(0.5)), Document::Number(Number::Float(0.5)));
    }

    #[test]
    fn test_invalid_image_data_is_configuration_error() {
        let body = json!({"messages": [{"role": "user", "content": [
            {"image": {"format": "png", "source": {"bytes": "not base64!"}}}
        ]}]});
        assert!(matches!(to_converse_parts(&body), Err(ProviderError::Configuration(_))));
    }
}
