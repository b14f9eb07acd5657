//! Conversion from the canonical context to Gemini `contents`

use crate::protocol::{AssistantMessage, ContentBlock, ImageContent, Message, Model, Tool, ToolResultMessage, UserContentBlock};
use crate::providers::adapter::AdapterRequest;
use crate::providers::options::google_tool_config;
use serde_json::{json, Map, Value};

fn inline_data(image: &ImageContent) -> Value {
    json!({"inlineData": {"mimeType": image.mime_type, "data": image.data}})
}

fn with_signature(mut part: Value, signature: Option<&str>) -> Value {
    if let Some(signature) = signature.filter(|s| !s.is_empty()) {
        part["thoughtSignature"] = json!(signature);
    }
    part
}

fn user_parts(parts: &[UserContentBlock], images: bool) -> Vec<Value> {
    parts
        .iter()
        .filter_map(|part| match part {
            UserContentBlock::Text(text) if text.text.is_empty() => None,
            UserContentBlock::Text(text) => Some(json!({"text": text.text})),
            UserContentBlock::Image(image) if images => Some(inline_data(image)),
            UserContentBlock::Image(_) => None,
        })
        .collect()
}

fn model_parts(assistant: &AssistantMessage) -> Vec<Value> {
    assistant
        .content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text(text) if text.text.trim().is_empty() => None,
            ContentBlock::Text(text) => Some(with_signature(
                json!({"text": text.text}),
                text.text_signature.as_deref(),
            )),
            // Opaque data from another vendor has no Gemini form.
            ContentBlock::Thinking(thinking) if thinking.redacted => None,
            ContentBlock::Thinking(thinking) if thinking.thinking.trim().is_empty() => None,
            ContentBlock::Thinking(thinking) => Some(with_signature(
                json!({"thought": true, "text": thinking.thinking}),
                thinking.thinking_signature.as_deref(),
            )),
            ContentBlock::ToolCall(call) => {
                let mut function_call = json!({
                    "name": call.name,
                    "args": Value::Object(call.arguments.clone()),
                });
                if !call.id.is_empty() {
                    function_call["id"] = json!(call.id);
                }
                Some(with_signature(
                    json!({"functionCall": function_call}),
                    call.thought_signature.as_deref(),
                ))
            }
        })
        .collect()
}

fn function_response(result: &ToolResultMessage, images: bool) -> Vec<Value> {
    let text = result.text_content();
    let text = if text.is_empty() && result.images().next().is_some() {
        "(see attached image)".to_string()
    } else {
        text
    };
    let key = if result.is_error { "error" } else { "output" };
    let mut response = json!({
        "name": result.tool_name,
        "response": { key: text },
    });
    if !result.tool_call_id.is_empty() {
        response["id"] = json!(result.tool_call_id);
    }

    let mut parts = vec![json!({ "functionResponse": response })];
    if images {
        parts.extend(result.images().map(inline_data));
    }
    parts
}

/// Convert the history; consecutive tool results share one user turn
pub fn to_contents(messages: &[Message], model: &Model) -> Vec<Value> {
    let images = model.supports_images();
    let mut contents = Vec::with_capacity(messages.len());
    let mut index = 0;

    while index < messages.len() {
        match &messages[index] {
            Message::User(user) => {
                let parts = user_parts(&user.content.parts(), images);
                if !parts.is_empty() {
                    contents.push(json!({"role": "user", "parts": parts}));
                }
                index += 1;
            }
            Message::Assistant(assistant) => {
                let parts = model_parts(assistant);
                if !parts.is_empty() {
                    contents.push(json!({"role": "model", "parts": parts}));
                }
                index += 1;
            }
            Message::ToolResult(_) => {
                let mut parts = Vec::new();
                while let Some(Message::ToolResult(result)) = messages.get(index) {
                    parts.extend(function_response(result, images));
                    index += 1;
                }
                contents.push(json!({"role": "user", "parts": parts}));
            }
        }
    }

    contents
}

fn to_declaration(tool: &Tool) -> Value {
    json!({
        "name": tool.name,
        "description": tool.description,
        "parameters": tool.parameters,
    })
}

/// Plain `systemInstruction` from the caller's prompt
pub fn system_instruction(prompt: Option<&str>) -> Option<Value> {
    prompt
        .filter(|prompt| !prompt.is_empty())
        .map(|prompt| json!({"parts": [{"text": prompt}]}))
}

/// Build a `GenerateContentRequest`
pub fn to_generate_request(request: &AdapterRequest) -> Map<String, Value> {
    let options = &request.options;
    let tools = request.context.tools();
    let mut body = Map::new();

    body.insert(
        "contents".into(),
        Value::Array(to_contents(&request.context.messages, &request.model)),
    );
    if let Some(instruction) = system_instruction(request.context.system_prompt.as_deref()) {
        body.insert("systemInstruction".into(), instruction);
    }

    let mut generation = Map::new();
    if let Some(temperature) = options.temperature {
        generation.insert("temperature".into(), json!(temperature));
    }
    if let Some(max_tokens) = options.max_tokens {
        generation.insert("maxOutputTokens".into(), json!(max_tokens));
    }
    if let Some(thinking) = request.vendor.google_thinking().to_json() {
        generation.insert("thinkingConfig".into(), thinking);
    }
    if !generation.is_empty() {
        body.insert("generationConfig".into(), Value::Object(generation));
    }

    if !tools.is_empty() {
        body.insert(
            "tools".into(),
            json!([{ "functionDeclarations": tools.iter().map(to_declaration).collect::<Vec<_>>() }]),
        );
        if let Some(choice) = &options.tool_choice {
            body.insert("toolConfig".into(), google_tool_config(choice));
        }
    }

    body
}
