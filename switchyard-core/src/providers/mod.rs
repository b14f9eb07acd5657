//! Provider adapters and the dispatch factory
//!
//! This module implements the adapter layer that turns one canonical
//! request into a vendor call and the vendor's stream back into canonical
//! events. [`Switchyard`] is the entry point: it owns the shared HTTP pool,
//! the credential cache and the tool-call id counter, and selects the
//! adapter for a model with an exhaustive match on its [`Api`].

pub mod adapter;
pub mod anthropic;
pub mod bedrock;
pub mod credentials;
mod driver;
pub mod error;
pub mod google;
pub mod openai;
pub mod options;
pub mod retry;
pub mod transform;

pub use adapter::{requires_strict_tool_call_ids, AdapterRequest, ApiAdapter, ToolCallCounter};
pub use anthropic::AnthropicAdapter;
pub use bedrock::BedrockAdapter;
pub use credentials::{Credential, CredentialResolver, EnvLookup};
pub use error::{ProviderError, ProviderResult};
pub use google::{GeminiCliAdapter, GoogleGenerativeAdapter, VertexAdapter};
pub use openai::{OpenAiCompletionsAdapter, OpenAiResponsesAdapter};
pub use options::{map_simple_options, VendorOptions};
pub use retry::{RetryExecutor, RetryOutcome, RetryPolicy};
pub use transform::transform_messages;

use crate::config::SwitchyardConfig;
use crate::http::HttpClient;
use crate::protocol::{Api, AssistantMessage, Context, Model, SimpleStreamOptions, StreamOptions};
use crate::stream::AssistantMessageEventStream;
use driver::Call;
use std::sync::Arc;
use tracing::debug;

/// Adapter serving `api`
pub fn adapter_for(api: Api) -> &'static dyn ApiAdapter {
    match api {
        Api::OpenAiCompletions => &OpenAiCompletionsAdapter,
        Api::OpenAiResponses => &OpenAiResponsesAdapter,
        Api::AnthropicMessages => &AnthropicAdapter,
        Api::GoogleGenerativeAi => &GoogleGenerativeAdapter,
        Api::GoogleGeminiCli => &GeminiCliAdapter,
        Api::GoogleVertex => &VertexAdapter,
        Api::BedrockConverseStream => &BedrockAdapter,
    }
}

/// Dispatch factory for streaming calls
///
/// Cheap to clone; clones share the connection pool, the credential cache
/// and the tool-call id counter.
#[derive(Clone)]
pub struct Switchyard {
    config: Arc<SwitchyardConfig>,
    http: HttpClient,
    resolver: Arc<CredentialResolver>,
    tool_call_ids: Arc<ToolCallCounter>,
}

impl Switchyard {
    /// Factory with default configuration
    pub fn new() -> ProviderResult<Self> {
        Self::from_config(SwitchyardConfig::default())
    }

    /// Factory using a loaded configuration
    pub fn from_config(config: SwitchyardConfig) -> ProviderResult<Self> {
        let config = Arc::new(config);
        let http = HttpClient::new()?;
        let resolver = Arc::new(CredentialResolver::new(Arc::clone(&config), http.clone()));
        Ok(Self {
            config,
            http,
            resolver,
            tool_call_ids: Arc::new(ToolCallCounter::new()),
        })
    }

    /// Fresh resolver bound to this factory's configuration and HTTP pool
    pub fn new_resolver(&self) -> CredentialResolver {
        CredentialResolver::new(Arc::clone(&self.config), self.http.clone())
    }

    /// Replace the credential resolver
    pub fn with_resolver(mut self, resolver: CredentialResolver) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    /// Replace the environment lookup used for credentials
    pub fn with_env(self, env: EnvLookup) -> Self {
        let resolver = self.new_resolver().with_env(env);
        self.with_resolver(resolver)
    }

    pub fn config(&self) -> &SwitchyardConfig {
        &self.config
    }

    /// Apply configured base-URL and header overrides for the model's provider
    fn configured_model(&self, model: &Model) -> Model {
        let mut model = model.clone();
        if let Some(provider) = self.config.provider(&model.provider) {
            if let Some(base_url) = provider.base_url.as_ref().filter(|url| !url.is_empty()) {
                model.base_url = base_url.clone();
            }
            for (name, value) in &provider.headers {
                model.headers.insert(name.clone(), value.clone());
            }
        }
        model
    }

    fn dispatch(
        &self,
        model: Model,
        context: Context,
        mut options: StreamOptions,
        vendor: VendorOptions,
    ) -> AssistantMessageEventStream {
        let defaults = &self.config.defaults;
        if options.cache_retention.is_none() {
            options.cache_retention = defaults.cache_retention;
        }
        if options.temperature.is_none() {
            options.temperature = defaults.temperature;
        }
        let retry = options.retry.clone().unwrap_or_else(|| self.config.retry.clone());

        debug!(
            api = %model.api,
            provider = %model.provider,
            model = %model.id,
            messages = context.messages.len(),
            "dispatching stream"
        );
        let call = Call {
            model: Arc::new(model),
            context,
            options,
            vendor,
            http: self.http.clone(),
            retry,
            tool_call_ids: Arc::clone(&self.tool_call_ids),
        };
        driver::spawn(adapter_for(call.model.api), Arc::clone(&self.resolver), call)
    }

    /// Start a streaming call with vendor-neutral options
    ///
    /// Reasoning is explicitly disabled; use
    /// [`stream_simple`](Self::stream_simple) to request a reasoning level. Must be called from within a tokio runtime.
    pub fn stream(&self, model: &Model, context: Context, options: StreamOptions) -> AssistantMessageEventStream {
        let model = self.configured_model(model);
        let vendor = VendorOptions::default_for(&model);
        self.dispatch(model, context, options, vendor)
    }

    /// Start a streaming call with a reasoning level mapped per vendor
    pub fn stream_simple(
        &self,
        model: &Model,
        context: Context,
        options: SimpleStreamOptions,
    ) -> AssistantMessageEventStream {
        let model = self.configured_model(model);
        let (options, vendor) = map_simple_options(&model, &options);
        self.dispatch(model, context, options, vendor)
    }

    /// Run a call to completion and return the final message
    pub async fn complete(&self, model: &Model, context: Context, options: StreamOptions) -> AssistantMessage {
        self.stream(model, context, options).result().await
    }

    /// [`complete`](Self::complete) with a reasoning level
    pub async fn complete_simple(
        &self,
        model: &Model,
        context: Context,
        options: SimpleStreamOptions,
    ) -> AssistantMessage {
        self.stream_simple(model, context, options).result().await
    }
}

impl std::fmt::Debug for Switchyard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Switchyard")
            .field("providers", &self.config.providers.len())
            .field("retry", &self.config.retry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;

    #[test]
    fn test_every_api_has_its_adapter() {
        for api in Api::ALL {
            assert_eq!(adapter_for(api).api(), api);
        }
    }

    #[test]
    fn test_only_google_retries_empty_streams() {
        for api in Api::ALL {
            assert_eq!(adapter_for(api).retries_empty_streams(), api.is_google(), "{api}");
        }
    }

    #[test]
    fn test_configured_overrides() {
        let mut provider = ProviderConfig::new("openai").with_base_url("http://localhost:9999/v1");
        provider.headers.insert("X-Team".into(), "core".into());
        let config = SwitchyardConfig {
            providers: vec![provider],
            ..SwitchyardConfig::default()
        };
        let yard = Switchyard::from_config(config).unwrap();

        let model = Model::new("gpt-4o", Api::OpenAiCompletions, "openai", "https://api.openai.com/v1");
        let configured = yard.configured_model(&model);
        assert_eq!(configured.base_url, "http://localhost:9999/v1");
        assert_eq!(configured.headers.get("X-Team").map(String::as_str), Some("core"));

        let other = Model::new("claude", Api::AnthropicMessages, "anthropic", "https://api.anthropic.com");
        assert_eq!(yard.configured_model(&other).base_url, "https://api.anthropic.com");
    }
}
