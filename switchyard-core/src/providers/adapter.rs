//! Adapter trait and per-API capabilities
//!
//! Every wire protocol implements [`ApiAdapter`]. The stream driver hands
//! an adapter a fully prepared [`AdapterRequest`] (credentials resolved,
//! history transformed, options mapped) and an [`EventSink`] to write into.

use crate::http::HttpClient;
use crate::protocol::{Api, Context, Model, StopReason, StreamOptions};
use crate::providers::credentials::Credential;
use crate::providers::error::ProviderResult;
use crate::providers::options::VendorOptions;
use crate::providers::retry::RetryPolicy;
use crate::stream::EventSink;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Core trait implemented once per wire protocol
#[async_trait]
pub trait ApiAdapter: Send + Sync {
    /// Wire protocol served by this adapter
    fn api(&self) -> Api;

    /// Whether a 200 stream without content is re-issued
    fn retries_empty_streams(&self) -> bool {
        false
    }

    /// Run one request, writing content into `sink`
    ///
    /// Returns the mapped stop reason. The driver emits the terminal event,
    /// so implementations never call [`EventSink::finish`] or
    /// [`EventSink::fail`] themselves.
    async fn stream(&self, request: &AdapterRequest, sink: &mut EventSink) -> ProviderResult<StopReason>;
}

/// Everything an adapter needs for one call
#[derive(Clone)]
pub struct AdapterRequest {
    /// Target model, with any configured base-URL override applied
    pub model: Arc<Model>,

    /// History already passed through the transformer
    pub context: Context,

    pub options: StreamOptions,

    /// Native reasoning shape for this vendor
    pub vendor: VendorOptions,

    pub credential: Credential,

    pub http: HttpClient,

    pub retry: RetryPolicy,

    pub signal: CancellationToken,

    /// Id source for tool calls the vendor leaves unnamed
    pub tool_call_ids: Arc<ToolCallCounter>,
}

impl AdapterRequest {
    /// Hand the outbound body to the caller's payload hook
    pub fn emit_payload(&self, body: &Value) {
        if let Some(hook) = &self.options.on_payload {
            hook(body);
        }
    }

    /// Model headers overlaid with request headers
    pub fn extra_headers(&self) -> Vec<(String, String)> {
        let mut headers: Vec<(String, String)> = self
            .model
            .headers
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        for (name, value) in &self.options.headers {
            headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
            headers.push((name.clone(), value.clone()));
        }
        headers
    }
}

/// Monotonic tool-call id source scoped to one factory
#[derive(Debug, Default)]
pub struct ToolCallCounter {
    next: AtomicU64,
}

impl ToolCallCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the form `{name}_{millis}_{n}`
    pub fn next_id(&self, name: &str) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}_{}_{}", name, crate::protocol::now_millis(), n)
    }
}

fn is_claude(model: &Model) -> bool {
    model.id.to_lowercase().contains("claude")
}

/// Whether the target vendor rejects tool-call ids outside `[A-Za-z0-9_-]{1,40}`
///
/// `compat.strict_tool_call_ids` overrides the table.
pub fn requires_strict_tool_call_ids(model: &Model) -> bool {
    if let Some(strict) = model.compat.as_ref().and_then(|c| c.strict_tool_call_ids) {
        return strict;
    }
    match model.api {
        Api::AnthropicMessages | Api::BedrockConverseStream | Api::OpenAiResponses => true,
        Api::OpenAiCompletions => match model.provider.as_str() {
            "openrouter" => model.id.starts_with("anthropic/"),
            "github-copilot" => is_claude(model),
            "mistral" => true,
            _ => false,
        },
        Api::GoogleGeminiCli => is_claude(model),
        Api::GoogleGenerativeAi | Api::GoogleVertex => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ModelCompat;
    use test_case::test_case;

    #[test_case(Api::AnthropicMessages, "anthropic", "claude-sonnet-4-5", true)]
    #[test_case(Api::BedrockConverseStream, "amazon-bedrock", "us.anthropic.claude-sonnet-4", true)]
    #[test_case(Api::OpenAiResponses, "openai", "gpt-5", true)]
    #[test_case(Api::OpenAiCompletions, "openai", "gpt-4o", false)]
    #[test_case(Api::OpenAiCompletions, "openrouter", "anthropic/claude-sonnet-4", true)]
    #[test_case(Api::OpenAiCompletions, "openrouter", "openai/gpt-4o", false)]
    #[test_case(Api::OpenAiCompletions, "github-copilot", "claude-sonnet-4", true)]
    #[test_case(Api::OpenAiCompletions, "github-copilot", "gpt-4.1", false)]
    #[test_case(Api::OpenAiCompletions, "mistral", "devstral-medium", true)]
    #[test_case(Api::GoogleGeminiCli, "google-antigravity", "claude-sonnet-4-5", true)]
    #[test_case(Api::GoogleGeminiCli, "google-gemini-cli", "gemini-2.5-pro", false)]
    #[test_case(Api::GoogleGenerativeAi, "google", "gemini-2.5-flash", false)]
    #[test_case(Api::GoogleVertex, "google-vertex", "gemini-2.5-pro", false)]
    fn test_strict_tool_call_ids(api: Api, provider: &str, id: &str, expected: bool) {
        let model = Model::new(id, api, provider, "http://localhost");
        assert_eq!(requires_strict_tool_call_ids(&model), expected);
    }

    #[test]
    fn test_compat_overrides_strict_table() {
        let model = Model::new("gpt-4o", Api::OpenAiCompletions, "custom", "http://localhost").with_compat(ModelCompat {
            strict_tool_call_ids: Some(true),
            ..Default::default()
        });
        assert!(requires_strict_tool_call_ids(&model));
    }

    #[test]
    fn test_tool_call_counter_is_monotonic() {
        let counter = ToolCallCounter::new();
        let first = counter.next_id("read");
        let second = counter.next_id("read");
        assert!(first.starts_with("read_") && first.ends_with("_1"));
        assert!(second.ends_with("_2"));
    }
}
