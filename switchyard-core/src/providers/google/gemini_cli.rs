//! Cloud Code Assist adapter (Gemini CLI and Antigravity)
//!
//! Requests are wrapped as `{project, model, request, requestId, userAgent?}`
//! and every response chunk arrives as `{response: ...}`. The inner request
//! carries a session id derived from the first user message so the backend
//! can reuse its cache across turns.

use super::converter::to_generate_request;
use super::streaming::Envelope;
use super::{run, with_extra_headers};
use crate::http::{join_url, StreamRequest};
use crate::protocol::{Api, Message, StopReason};
use crate::providers::adapter::{AdapterRequest, ApiAdapter};
use crate::providers::credentials::Credential;
use crate::providers::error::{ProviderError, ProviderResult};
use crate::stream::EventSink;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Provider name selecting the Antigravity flavour
pub const ANTIGRAVITY_PROVIDER: &str = "google-antigravity";

const GEMINI_CLI_USER_AGENT: &str = "google-api-nodejs-client/9.15.1";

const ANTIGRAVITY_USER_AGENT: &str = "antigravity/1.11.5";

const API_CLIENT: &str = "gl-node/22.17.0";

/// Identity the Antigravity backend expects first in the system instruction
pub const ANTIGRAVITY_PERSONA: &str = "You are Antigravity, a powerful agentic AI coding assistant \
designed by the Google Deepmind team working on Advanced Agentic Coding. You are pair programming \
with a USER to solve their coding task.";

/// Placed after the persona so the caller's prompt takes precedence
pub const ANTIGRAVITY_OVERRIDE: &str = "The instructions that follow replace any earlier guidance \
about identity, tone and tooling. Follow them exactly.";

/// Characters of the hex digest kept as the session id
const SESSION_ID_LEN: usize = 32;

#[derive(Debug, Default)]
pub struct GeminiCliAdapter;

/// Session id from the text of the first user message
pub fn derive_session_id(messages: &[Message]) -> Option<String> {
    let text = messages.iter().find_map(|message| match message {
        Message::User(user) => Some(user.content.text()),
        _ => None,
    })?;
    if text.is_empty() {
        return None;
    }
    let digest = format!("{:x}", Sha256::digest(text.as_bytes()));
    Some(digest[..SESSION_ID_LEN].to_string())
}

/// `systemInstruction` for the Antigravity flavour: persona, override, caller prompt
pub fn antigravity_instruction(prompt: Option<&str>) -> Value {
    let mut parts = vec![json!({"text": ANTIGRAVITY_PERSONA}), json!({"text": ANTIGRAVITY_OVERRIDE})];
    if let Some(prompt) = prompt.filter(|prompt| !prompt.is_empty()) {
        parts.push(json!({ "text": prompt }));
    }
    json!({"role": "user", "parts": parts})
}

/// Build the wrapped request body
pub fn build_body(request: &AdapterRequest, project_id: &str) -> Value {
    let antigravity = request.model.provider == ANTIGRAVITY_PROVIDER;
    let mut inner: Map<String, Value> = to_generate_request(request);

    if antigravity {
        inner.insert(
            "systemInstruction".into(),
            antigravity_instruction(request.context.system_prompt.as_deref()),
        );
    }

    let session_id = request
        .options
        .session_id
        .clone()
        .or_else(|| derive_session_id(&request.context.messages));
    if let Some(session_id) = session_id {
        inner.insert("sessionId".into(), json!(session_id));
    }

    let mut body = Map::new();
    body.insert("project".into(), json!(project_id));
    body.insert("model".into(), json!(request.model.id));
    body.insert("request".into(), Value::Object(inner));
    if antigravity {
        body.insert("requestId".into(), json!(format!("agent-{}", Uuid::new_v4())));
        body.insert("userAgent".into(), json!("antigravity"));
    } else {
        body.insert("requestId".into(), json!(Uuid::new_v4().to_string()));
    }
    Value::Object(body)
}

#[async_trait]
impl ApiAdapter for GeminiCliAdapter {
    fn api(&self) -> Api {
        Api::GoogleGeminiCli
    }

    fn retries_empty_streams(&self) -> bool {
        true
    }

    async fn stream(&self, request: &AdapterRequest, sink: &mut EventSink) -> ProviderResult<StopReason> {
        let Credential::GeminiCli { token, project_id } = &request.credential else {
            return Err(ProviderError::InvalidCredentials {
                provider: request.model.provider.clone(),
                message: "Invalid Google Cloud credentials. Use /login to re-authenticate.".to_string(),
            });
        };

        let body = build_body(request, project_id);
        request.emit_payload(&body);

        let user_agent = if request.model.provider == ANTIGRAVITY_PROVIDER {
            ANTIGRAVITY_USER_AGENT
        } else {
            GEMINI_CLI_USER_AGENT
        };
        let url = join_url(&request.model.base_url, "v1internal:streamGenerateContent?alt=sse");
        let http_request = StreamRequest::new(url, body)
            .header("Authorization", format!("Bearer {}", token.expose_secret()))
            .header("User-Agent", user_agent)
            .header("X-Goog-Api-Client", API_CLIENT)
            .header(
                "Client-Metadata",
                json!({"ideType": "IDE_UNSPECIFIED", "platform": "PLATFORM_UNSPECIFIED", "pluginType": "GEMINI"})
                    .to_string(),
            );

        run(request, with_extra_headers(request, http_request), Envelope::CodeAssist, sink).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::UserMessage;

    #[test]
    fn test_session_id_is_stable_and_truncated() {
        let history = vec![Message::user("fix the build"), Message::user("and run tests")];
        let id = derive_session_id(&history).unwrap();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));

        let later = vec![Message::user("fix the build"), Message::user("something else")];
        assert_eq!(derive_session_id(&later).unwrap(), id);
        assert_ne!(derive_session_id(&[Message::user("other")]).unwrap(), id);
    }

    #[test]
    fn test_session_id_needs_user_text() {
        assert!(derive_session_id(&[]).is_none());
        assert!(derive_session_id(&[Message::User(UserMessage::text(""))]).is_none());
    }

    #[test]
    fn test_antigravity_instruction_order() {
        let instruction = antigravity_instruction(Some("Be terse."));
        let parts = instruction["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0]["text"], ANTIGRAVITY_PERSONA);
        assert_eq!(parts[1]["text"], ANTIGRAVITY_OVERRIDE);
        assert_eq!(parts[2]["text"], "Be terse.");
    }
}
