//! Vendor-neutral option mapping
//!
//! [`map_simple_options`] turns a reasoning level into the native shape of
//! the target vendor: an effort string, a thinking-token budget or a Gemini
//! thinking level. The tool-choice helpers render [`ToolChoice`] for each
//! wire format.

use crate::protocol::{Api, Model, SimpleStreamOptions, StreamOptions, ThinkingLevel, ToolChoice};
use serde_json::{json, Value};

/// Output tokens always left for the visible answer
pub const MIN_OUTPUT_TOKENS: u64 = 1024;

/// Default output ceiling when the caller gives none
const DEFAULT_MAX_TOKENS_CAP: u64 = 32_000;

/// Thinking budgets for Anthropic-style token budgets
const CLAUDE_BUDGETS: [u32; 4] = [1024, 2048, 8192, 16384];

/// Gemini 2.5 Pro budgets (minimal, low, medium, high)
const GEMINI_PRO_BUDGETS: [u32; 4] = [128, 2048, 8192, 32768];

/// Gemini 2.5 Flash budgets (minimal, low, medium, high)
const GEMINI_FLASH_BUDGETS: [u32; 4] = [128, 2048, 8192, 24576];

/// Anthropic and Bedrock Claude thinking switch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThinkingConfig {
    Disabled,
    Enabled { budget_tokens: u32 },
}

/// Gemini 3 thinking levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoogleThinkingLevel {
    Minimal,
    Low,
    Medium,
    High,
}

impl GoogleThinkingLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoogleThinkingLevel::Minimal => "MINIMAL",
            GoogleThinkingLevel::Low => "LOW",
            GoogleThinkingLevel::Medium => "MEDIUM",
            GoogleThinkingLevel::High => "HIGH",
        }
    }
}

/// Gemini `thinkingConfig`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoogleThinking {
    /// Send no thinking config
    Omit,
    Budget { tokens: u32, include_thoughts: bool },
    Level { level: GoogleThinkingLevel, include_thoughts: bool },
}

impl GoogleThinking {
    /// Render as a `thinkingConfig` object
    pub fn to_json(&self) -> Option<Value> {
        match self {
            GoogleThinking::Omit => None,
            GoogleThinking::Budget {
                tokens,
                include_thoughts,
            } => Some(json!({"thinkingBudget": tokens, "includeThoughts": include_thoughts})),
            GoogleThinking::Level {
                level,
                include_thoughts,
            } => Some(json!({"thinkingLevel": level.as_str(), "includeThoughts": include_thoughts})),
        }
    }
}

/// Native reasoning options, one variant per vendor family
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VendorOptions {
    /// Chat completions and responses
    OpenAi { reasoning_effort: Option<String> },
    Anthropic { thinking: ThinkingConfig },
    Google { thinking: GoogleThinking },
    Bedrock { thinking: ThinkingConfig },
}

impl VendorOptions {
    /// Options with reasoning explicitly turned off for `model`
    ///
    /// Same native shape as [`map_simple_options`] with no reasoning level,
    /// so vendors that think by default are told not to.
    pub fn default_for(model: &Model) -> Self {
        let none = SimpleStreamOptions::default();
        match model.api {
            Api::OpenAiCompletions | Api::OpenAiResponses => VendorOptions::OpenAi {
                reasoning_effort: openai_effort(model, None),
            },
            Api::AnthropicMessages => VendorOptions::Anthropic {
                thinking: ThinkingConfig::Disabled,
            },
            Api::GoogleGenerativeAi | Api::GoogleGeminiCli | Api::GoogleVertex if is_claude_model(model) => {
                VendorOptions::Google {
                    thinking: GoogleThinking::Omit,
                }
            }
            Api::GoogleGenerativeAi | Api::GoogleGeminiCli | Api::GoogleVertex => VendorOptions::Google {
                thinking: google_thinking(model, &none),
            },
            Api::BedrockConverseStream => VendorOptions::Bedrock {
                thinking: ThinkingConfig::Disabled,
            },
        }
    }

    pub fn reasoning_effort(&self) -> Option<&str> {
        match self {
            VendorOptions::OpenAi { reasoning_effort } => reasoning_effort.as_deref(),
            _ => None,
        }
    }

    pub fn claude_thinking(&self) -> ThinkingConfig {
        match self {
            VendorOptions::Anthropic { thinking } | VendorOptions::Bedrock { thinking } => *thinking,
            _ => ThinkingConfig::Disabled,
        }
    }

    pub fn google_thinking(&self) -> GoogleThinking {
        match self {
            VendorOptions::Google { thinking } => *thinking,
            _ => GoogleThinking::Omit,
        }
    }
}

fn level_index(level: ThinkingLevel) -> usize {
    match level.clamp_to_high() {
        ThinkingLevel::Minimal => 0,
        ThinkingLevel::Low => 1,
        ThinkingLevel::Medium => 2,
        ThinkingLevel::High | ThinkingLevel::Xhigh => 3,
    }
}

/// Grow the output ceiling by the thinking budget
///
/// Returns `(max_tokens, budget)`. The sum is clamped to the model limit;
/// when the clamped ceiling cannot hold the budget, the budget shrinks so
/// [`MIN_OUTPUT_TOKENS`] remain for the answer.
pub fn adjust_max_tokens_for_thinking(base_max_tokens: u64, model_max_tokens: u64, budget: u32) -> (u64, u32) {
    let budget_tokens = u64::from(budget);
    let max_tokens = (base_max_tokens + budget_tokens).min(model_max_tokens);
    let budget = if max_tokens <= budget_tokens {
        max_tokens.saturating_sub(MIN_OUTPUT_TOKENS) as u32
    } else {
        budget
    };
    (max_tokens, budget)
}

fn is_claude_model(model: &Model) -> bool {
    model.id.to_lowercase().contains("claude")
}

fn supports_reasoning_effort(model: &Model) -> bool {
    if let Some(supported) = model.compat.as_ref().and_then(|c| c.supports_reasoning_effort) {
        return supported;
    }
    model.api == Api::OpenAiResponses || model.provider == "openai"
}

fn openai_effort(model: &Model, level: Option<ThinkingLevel>) -> Option<String> {
    if !model.reasoning || !supports_reasoning_effort(model) {
        return None;
    }
    let compat = model.compat();
    match level {
        Some(ThinkingLevel::Xhigh) if compat.supports_xhigh.unwrap_or(false) => Some("xhigh".to_string()),
        Some(level) => Some(level.clamp_to_high().as_str().to_string()),
        None => Some(compat.min_reasoning_effort.unwrap_or_else(|| "minimal".to_string())),
    }
}

fn claude_thinking(model: &Model, options: &mut StreamOptions, simple: &SimpleStreamOptions) -> ThinkingConfig {
    let Some(level) = simple.reasoning.filter(|_| model.reasoning) else {
        return ThinkingConfig::Disabled;
    };
    let budget = simple
        .thinking_budgets
        .get(level)
        .unwrap_or(CLAUDE_BUDGETS[level_index(level)]);
    let base = options
        .max_tokens
        .unwrap_or_else(|| model.max_tokens.min(DEFAULT_MAX_TOKENS_CAP));
    let (max_tokens, budget) = adjust_max_tokens_for_thinking(base, model.max_tokens, budget);
    options.max_tokens = Some(max_tokens);
    if u64::from(budget) < MIN_OUTPUT_TOKENS {
        ThinkingConfig::Disabled
    } else {
        ThinkingConfig::Enabled { budget_tokens: budget }
    }
}

fn gemini_family(model: &Model) -> (bool, bool) {
    let id = model.id.to_lowercase();
    (id.contains("gemini-3"), id.contains("pro"))
}

fn google_thinking(model: &Model, simple: &SimpleStreamOptions) -> GoogleThinking {
    if !model.reasoning {
        return GoogleThinking::Omit;
    }
    let (gemini3, pro) = gemini_family(model);

    match simple.reasoning {
        Some(level) if gemini3 => {
            let level = match (pro, level.clamp_to_high()) {
                (true, ThinkingLevel::Minimal | ThinkingLevel::Low) => GoogleThinkingLevel::Low,
                (true, _) => GoogleThinkingLevel::High,
                (false, ThinkingLevel::Minimal) => GoogleThinkingLevel::Minimal,
                (false, ThinkingLevel::Low) => GoogleThinkingLevel::Low,
                (false, ThinkingLevel::Medium) => GoogleThinkingLevel::Medium,
                (false, _) => GoogleThinkingLevel::High,
            };
            GoogleThinking::Level {
                level,
                include_thoughts: true,
            }
        }
        Some(level) => {
            let table = if pro { GEMINI_PRO_BUDGETS } else { GEMINI_FLASH_BUDGETS };
            GoogleThinking::Budget {
                tokens: simple.thinking_budgets.get(level).unwrap_or(table[level_index(level)]),
                include_thoughts: true,
            }
        }
        None if gemini3 => GoogleThinking::Level {
            level: if pro {
                GoogleThinkingLevel::Low
            } else {
                GoogleThinkingLevel::Minimal
            },
            include_thoughts: false,
        },
        // 2.5 Pro cannot turn thinking off; 128 is its floor.
        None if pro => GoogleThinking::Budget {
            tokens: GEMINI_PRO_BUDGETS[0],
            include_thoughts: false,
        },
        None => GoogleThinking::Budget {
            tokens: 0,
            include_thoughts: false,
        },
    }
}

/// Map a vendor-neutral option set to the target's native shape
pub fn map_simple_options(model: &Model, simple: &SimpleStreamOptions) -> (StreamOptions, VendorOptions) {
    let mut options = simple.base.clone();
    let vendor = match model.api {
        Api::OpenAiCompletions | Api::OpenAiResponses => VendorOptions::OpenAi {
            reasoning_effort: openai_effort(model, simple.reasoning),
        },
        Api::AnthropicMessages => VendorOptions::Anthropic {
            thinking: claude_thinking(model, &mut options, simple),
        },
        Api::GoogleGenerativeAi | Api::GoogleGeminiCli | Api::GoogleVertex => {
            if is_claude_model(model) {
                // Claude served through Cloud Code Assist takes a Gemini-shaped budget.
                let thinking = match claude_thinking(model, &mut options, simple) {
                    ThinkingConfig::Enabled { budget_tokens } => GoogleThinking::Budget {
                        tokens: budget_tokens,
                        include_thoughts: true,
                    },
                    ThinkingConfig::Disabled => GoogleThinking::Omit,
                };
                VendorOptions::Google { thinking }
            } else {
                VendorOptions::Google {
                    thinking: google_thinking(model, simple),
                }
            }
        }
        Api::BedrockConverseStream => VendorOptions::Bedrock {
            thinking: if is_claude_model(model) {
                claude_thinking(model, &mut options, simple)
            } else {
                ThinkingConfig::Disabled
            },
        },
    };
    (options, vendor)
}

/// `tool_choice` for chat completions
pub fn openai_completions_tool_choice(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => json!("auto"),
        ToolChoice::None => json!("none"),
        ToolChoice::Required => json!("required"),
        ToolChoice::Tool(name) => json!({"type": "function", "function": {"name": name}}),
    }
}

/// `tool_choice` for the responses API
pub fn openai_responses_tool_choice(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => json!("auto"),
        ToolChoice::None => json!("none"),
        ToolChoice::Required => json!("required"),
        ToolChoice::Tool(name) => json!({"type": "function", "name": name}),
    }
}

/// `tool_choice` for Anthropic messages
pub fn anthropic_tool_choice(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => json!({"type": "auto"}),
        ToolChoice::None => json!({"type": "none"}),
        ToolChoice::Required => json!({"type": "any"}),
        ToolChoice::Tool(name) => json!({"type": "tool", "name": name}),
    }
}

/// `toolConfig` for Gemini
pub fn google_tool_config(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => json!({"functionCallingConfig": {"mode": "AUTO"}}),
        ToolChoice::None => json!({"functionCallingConfig": {"mode": "NONE"}}),
        ToolChoice::Required => json!({"functionCallingConfig": {"mode": "ANY"}}),
        ToolChoice::Tool(name) => json!({
            "functionCallingConfig": {"mode": "ANY", "allowedFunctionNames": [name]}
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ModelCompat, ThinkingBudgets};
    use test_case::test_case;

    fn simple(level: Option<ThinkingLevel>) -> SimpleStreamOptions {
        SimpleStreamOptions {
            reasoning: level,
            ..Default::default()
        }
    }

    #[test_case(ThinkingLevel::Minimal, 1024)]
    #[test_case(ThinkingLevel::Low, 2048)]
    #[test_case(ThinkingLevel::Medium, 8192)]
    #[test_case(ThinkingLevel::High, 16384)]
    #[test_case(ThinkingLevel::Xhigh, 16384)]
    fn test_anthropic_budgets(level: ThinkingLevel, budget: u32) {
        let model = Model::new("claude-sonnet-4-5", Api::AnthropicMessages, "anthropic", "")
            .with_reasoning(true)
            .with_max_tokens(64_000);
        let (options, vendor) = map_simple_options(&model, &simple(Some(level)));
        assert_eq!(
            vendor,
            VendorOptions::Anthropic {
                thinking: ThinkingConfig::Enabled { budget_tokens: budget }
            }
        );
        assert_eq!(options.max_tokens, Some((32_000 + budget as u64).min(64_000)));
    }

    #[test]
    fn test_budget_shrinks_to_fit_model_limit() {
        assert_eq!(adjust_max_tokens_for_thinking(8192, 8192, 16384), (8192, 7168));
        assert_eq!(adjust_max_tokens_for_thinking(4096, 64_000, 2048), (6144, 2048));
        assert_eq!(adjust_max_tokens_for_thinking(0, 512, 1024), (512, 0));
    }

    #[test]
    fn test_absent_effort_disables_claude_thinking() {
        let model = Model::new("claude-sonnet-4-5", Api::AnthropicMessages, "anthropic", "").with_reasoning(true);
        let (options, vendor) = map_simple_options(&model, &simple(None));
        assert_eq!(vendor.claude_thinking(), ThinkingConfig::Disabled);
        assert_eq!(options.max_tokens, None);
    }

    #[test]
    fn test_custom_budgets_win() {
        let model = Model::new("claude-opus-4", Api::BedrockConverseStream, "amazon-bedrock", "")
            .with_reasoning(true)
            .with_max_tokens(64_000);
        let options = simple(Some(ThinkingLevel::Low)).with_thinking_budgets(ThinkingBudgets {
            low: Some(4000),
            ..Default::default()
        });
        let (_, vendor) = map_simple_options(&model, &options);
        assert_eq!(vendor.claude_thinking(), ThinkingConfig::Enabled { budget_tokens: 4000 });
    }

    #[test_case("gemini-2.5-pro", ThinkingLevel::High, 32768)]
    #[test_case("gemini-2.5-flash", ThinkingLevel::High, 24576)]
    #[test_case("gemini-2.5-flash", ThinkingLevel::Minimal, 128)]
    #[test_case("gemini-2.5-pro", ThinkingLevel::Medium, 8192)]
    fn test_gemini_25_budgets(id: &str, level: ThinkingLevel, tokens: u32) {
        let model = Model::new(id, Api::GoogleGenerativeAi, "google", "").with_reasoning(true);
        let (_, vendor) = map_simple_options(&model, &simple(Some(level)));
        assert_eq!(
            vendor.google_thinking(),
            GoogleThinking::Budget {
                tokens,
                include_thoughts: true
            }
        );
    }

    #[test_case("gemini-3-pro-preview", ThinkingLevel::Minimal, GoogleThinkingLevel::Low)]
    #[test_case("gemini-3-pro-preview", ThinkingLevel::Medium, GoogleThinkingLevel::High)]
    #[test_case("gemini-3-flash", ThinkingLevel::Medium, GoogleThinkingLevel::Medium)]
    fn test_gemini_3_levels(id: &str, level: ThinkingLevel, expected: GoogleThinkingLevel) {
        let model = Model::new(id, Api::GoogleVertex, "google-vertex", "").with_reasoning(true);
        let (_, vendor) = map_simple_options(&model, &simple(Some(level)));
        assert_eq!(
            vendor.google_thinking(),
            GoogleThinking::Level {
                level: expected,
                include_thoughts: true
            }
        );
    }

    #[test]
    fn test_gemini_disabled_reasoning() {
        let flash = Model::new("gemini-2.5-flash", Api::GoogleGenerativeAi, "google", "").with_reasoning(true);
        let (_, vendor) = map_simple_options(&flash, &simple(None));
        assert_eq!(
            vendor.google_thinking().to_json(),
            Some(json!({"thinkingBudget": 0, "includeThoughts": false}))
        );
    }

    #[test_case("gpt-5", Api::OpenAiResponses, "openai")]
    #[test_case("o4-mini", Api::OpenAiCompletions, "openai")]
    #[test_case("gemini-2.5-flash", Api::GoogleGenerativeAi, "google")]
    #[test_case("gemini-2.5-pro", Api::GoogleVertex, "google-vertex")]
    #[test_case("gemini-3-pro-preview", Api::GoogleGeminiCli, "google-gemini-cli")]
    #[test_case("claude-sonnet-4-5", Api::GoogleGeminiCli, "google-antigravity")]
    #[test_case("claude-sonnet-4-5", Api::AnthropicMessages, "anthropic")]
    #[test_case("anthropic.claude-sonnet-4-5", Api::BedrockConverseStream, "amazon-bedrock")]
    fn test_default_matches_unset_reasoning(id: &str, api: Api, provider: &str) {
        let model = Model::new(id, api, provider, "").with_reasoning(true);
        let (_, mapped) = map_simple_options(&model, &simple(None));
        assert_eq!(VendorOptions::default_for(&model), mapped);
    }

    #[test]
    fn test_openai_effort() {
        let model = Model::new("gpt-5", Api::OpenAiResponses, "openai", "").with_reasoning(true);
        let (_, vendor) = map_simple_options(&model, &simple(Some(ThinkingLevel::Xhigh)));
        assert_eq!(vendor.reasoning_effort(), Some("high"));

        let model = model.with_compat(ModelCompat {
            supports_xhigh: Some(true),
            min_reasoning_effort: Some("low".into()),
            ..Default::default()
        });
        let (_, vendor) = map_simple_options(&model, &simple(Some(ThinkingLevel::Xhigh)));
        assert_eq!(vendor.reasoning_effort(), Some("xhigh"));
        let (_, vendor) = map_simple_options(&model, &simple(None));
        assert_eq!(vendor.reasoning_effort(), Some("low"));
    }

    #[test]
    fn test_openai_non_reasoning_sends_no_effort() {
        let model = Model::new("llama-3.3-70b", Api::OpenAiCompletions, "groq", "");
        let (_, vendor) = map_simple_options(&model, &simple(Some(ThinkingLevel::High)));
        assert_eq!(vendor.reasoning_effort(), None);
    }

    #[test]
    fn test_tool_choice_shapes() {
        let forced = ToolChoice::Tool("read".into());
        assert_eq!(openai_completions_tool_choice(&forced)["function"]["name"], "read");
        assert_eq!(openai_responses_tool_choice(&forced)["name"], "read");
        assert_eq!(anthropic_tool_choice(&ToolChoice::Required), json!({"type": "any"}));
        assert_eq!(
            google_tool_config(&forced)["functionCallingConfig"]["allowedFunctionNames"],
            json!(["read"])
        );
    }
}
