//! Model descriptors and wire protocol tags

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Wire protocol spoken by a model endpoint
///
/// The set is closed: dispatch matches on it exhaustively, so adding a
/// variant forces every adapter table to be revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Api {
    #[serde(rename = "openai-completions")]
    OpenAiCompletions,
    #[serde(rename = "openai-responses")]
    OpenAiResponses,
    #[serde(rename = "anthropic-messages")]
    AnthropicMessages,
    #[serde(rename = "google-generative-ai")]
    GoogleGenerativeAi,
    #[serde(rename = "google-gemini-cli")]
    GoogleGeminiCli,
    #[serde(rename = "google-vertex")]
    GoogleVertex,
    #[serde(rename = "bedrock-converse-stream")]
    BedrockConverseStream,
}

impl Api {
    pub const ALL: [Api; 7] = [
        Api::OpenAiCompletions,
        Api::OpenAiResponses,
        Api::AnthropicMessages,
        Api::GoogleGenerativeAi,
        Api::GoogleGeminiCli,
        Api::GoogleVertex,
        Api::BedrockConverseStream,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Api::OpenAiCompletions => "openai-completions",
            Api::OpenAiResponses => "openai-responses",
            Api::AnthropicMessages => "anthropic-messages",
            Api::GoogleGenerativeAi => "google-generative-ai",
            Api::GoogleGeminiCli => "google-gemini-cli",
            Api::GoogleVertex => "google-vertex",
            Api::BedrockConverseStream => "bedrock-converse-stream",
        }
    }

    /// Whether this API belongs to the Gemini family
    pub fn is_google(&self) -> bool {
        matches!(
            self,
            Api::GoogleGenerativeAi | Api::GoogleGeminiCli | Api::GoogleVertex
        )
    }
}

impl fmt::Display for Api {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown API tag
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported API: {0}")]
pub struct UnsupportedApi(pub String);

impl FromStr for Api {
    type Err = UnsupportedApi;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Api::ALL
            .into_iter()
            .find(|api| api.as_str() == s)
            .ok_or_else(|| UnsupportedApi(s.to_string()))
    }
}

/// Input modality accepted by a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputModality {
    Text,
    Image,
}

/// Prices in dollars per million tokens
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelCost {
    pub input: f64,
    pub output: f64,
    #[serde(default)]
    pub cache_read: f64,
    #[serde(default)]
    pub cache_write: f64,
}

/// Name of the output-token field in chat-completions bodies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxTokensField {
    #[default]
    MaxCompletionTokens,
    MaxTokens,
}

/// Per-model overrides of vendor behaviour
///
/// Every field is optional; `None` means "use the default derived from the
/// provider and base URL".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelCompat {
    /// Accepts the `developer` role for system prompts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supports_developer_role: Option<bool>,

    /// Accepts `reasoning_effort`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supports_reasoning_effort: Option<bool>,

    /// Reports usage in the final streamed chunk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supports_usage_in_streaming: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens_field: Option<MaxTokensField>,

    /// Effort sent when reasoning is disabled on a model that cannot turn it off
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_reasoning_effort: Option<String>,

    /// Accepts `xhigh` effort
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supports_xhigh: Option<bool>,

    /// Force strict tool-call-id normalization on or off
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict_tool_call_ids: Option<bool>,
}

/// Static description of a callable model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub id: String,
    pub name: String,
    pub api: Api,
    pub provider: String,
    pub base_url: String,
    #[serde(default)]
    pub reasoning: bool,
    #[serde(default = "default_input")]
    pub input: Vec<InputModality>,
    #[serde(default)]
    pub cost: ModelCost,
    pub context_window: u64,
    pub max_tokens: u64,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compat: Option<ModelCompat>,
}

fn default_input() -> Vec<InputModality> {
    vec![InputModality::Text]
}

impl Model {
    /// Create a model with text input, no pricing and a 128k context
    pub fn new(
        id: impl Into<String>,
        api: Api,
        provider: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            api,
            provider: provider.into(),
            base_url: base_url.into(),
            reasoning: false,
            input: default_input(),
            cost: ModelCost::default(),
            context_window: 128_000,
            max_tokens: 16_384,
            headers: HashMap::new(),
            compat: None,
        }
    }

    pub fn with_reasoning(mut self, reasoning: bool) -> Self {
        self.reasoning = reasoning;
        self
    }

    pub fn with_cost(mut self, cost: ModelCost) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_input(mut self, input: Vec<InputModality>) -> Self {
        self.input = input;
        self
    }

    pub fn with_compat(mut self, compat: ModelCompat) -> Self {
        self.compat = Some(compat);
        self
    }

    pub fn supports_images(&self) -> bool {
        self.input.contains(&InputModality::Image)
    }

    /// Compat overrides, defaulted when absent
    pub fn compat(&self) -> ModelCompat {
        self.compat.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_tags_round_trip() {
        for api in Api::ALL {
            assert_eq!(api.as_str().parse::<Api>().unwrap(), api);
            let encoded = serde_json::to_string(&api).unwrap();
            assert_eq!(encoded, format!("\"{}\"", api.as_str()));
        }
    }

    #[test]
    fn test_unknown_api_rejected() {
        let err = "cursor-agent".parse::<Api>().unwrap_err();
        assert_eq!(err.to_string(), "Unsupported API: cursor-agent");
    }

    #[test]
    fn test_model_deserializes_with_defaults() {
        let model: Model = serde_json::from_value(serde_json::json!({
            "id": "gpt-4o",
            "name": "GPT-4o",
            "api": "openai-completions",
            "provider": "openai",
            "baseUrl": "https://api.openai.com/v1",
            "contextWindow": 128000,
            "maxTokens": 16384
        }))
        .unwrap();
        assert_eq!(model.input, vec![InputModality::Text]);
        assert!(!model.reasoning);
        assert!(model.compat.is_none());
    }
}
