//! Vendor-neutral request options
//!
//! [`StreamOptions`] carries the knobs every adapter understands;
//! [`SimpleStreamOptions`] adds a reasoning level that dispatch maps into
//! each vendor's native reasoning shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::providers::retry::RetryPolicy;

/// Reasoning effort requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingLevel {
    Minimal,
    Low,
    Medium,
    High,
    Xhigh,
}

impl ThinkingLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThinkingLevel::Minimal => "minimal",
            ThinkingLevel::Low => "low",
            ThinkingLevel::Medium => "medium",
            ThinkingLevel::High => "high",
            ThinkingLevel::Xhigh => "xhigh",
        }
    }

    /// `xhigh` collapsed to `high` for vendors without it
    pub fn clamp_to_high(self) -> Self {
        match self {
            ThinkingLevel::Xhigh => ThinkingLevel::High,
            other => other,
        }
    }
}

/// Caller overrides for per-level thinking budgets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThinkingBudgets {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimal: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medium: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<u32>,
}

impl ThinkingBudgets {
    pub fn get(&self, level: ThinkingLevel) -> Option<u32> {
        match level.clamp_to_high() {
            ThinkingLevel::Minimal => self.minimal,
            ThinkingLevel::Low => self.low,
            ThinkingLevel::Medium => self.medium,
            ThinkingLevel::High | ThinkingLevel::Xhigh => self.high,
        }
    }
}

/// How the model may pick tools
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    Auto,
    None,
    Required,
    /// Force one named tool
    Tool(String),
}

/// Prompt-cache retention hint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheRetention {
    None,
    #[default]
    Short,
    Long,
}

/// Callback receiving the exact outbound body before it is sent
pub type PayloadHook = Arc<dyn Fn(&Value) + Send + Sync>;

/// Options understood by every adapter
#[derive(Clone, Default)]
pub struct StreamOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u64>,

    /// Explicit credential, highest precedence
    pub api_key: Option<String>,

    /// Fires to abort the request
    pub signal: Option<CancellationToken>,

    /// Extra request headers, applied after model headers
    pub headers: HashMap<String, String>,

    /// Session identifier used for prompt caching and request threading
    pub session_id: Option<String>,

    pub cache_retention: Option<CacheRetention>,

    pub tool_choice: Option<ToolChoice>,

    /// Replaces the factory retry policy for this call
    pub retry: Option<RetryPolicy>,

    pub on_payload: Option<PayloadHook>,
}

impl fmt::Debug for StreamOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamOptions")
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("signal", &self.signal.is_some())
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("session_id", &self.session_id)
            .field("cache_retention", &self.cache_retention)
            .field("tool_choice", &self.tool_choice)
            .field("retry", &self.retry)
            .field("on_payload", &self.on_payload.is_some())
            .finish()
    }
}

impl StreamOptions {
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_signal(mut self, signal: CancellationToken) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.tool_choice = Some(tool_choice);
        self
    }

    pub fn with_payload_hook(mut self, hook: impl Fn(&Value) + Send + Sync + 'static) -> Self {
        self.on_payload = Some(Arc::new(hook));
        self
    }

    /// Effective cache retention
    pub fn cache_retention(&self) -> CacheRetention {
        self.cache_retention.unwrap_or_default()
    }
}

/// [`StreamOptions`] plus a vendor-neutral reasoning level
#[derive(Debug, Clone, Default)]
pub struct SimpleStreamOptions {
    pub base: StreamOptions,

    /// `None` disables reasoning explicitly
    pub reasoning: Option<ThinkingLevel>,

    pub thinking_budgets: ThinkingBudgets,
}

impl SimpleStreamOptions {
    pub fn new(base: StreamOptions) -> Self {
        Self {
            base,
            ..Self::default()
        }
    }

    pub fn with_reasoning(mut self, level: ThinkingLevel) -> Self {
        self.reasoning = Some(level);
        self
    }

    pub fn with_thinking_budgets(mut self, budgets: ThinkingBudgets) -> Self {
        self.thinking_budgets = budgets;
        self
    }
}

impl From<StreamOptions> for SimpleStreamOptions {
    fn from(base: StreamOptions) -> Self {
        Self::new(base)
    }
}
