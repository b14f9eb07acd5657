//! Switchyard Core Library
//!
//! One canonical conversation model, streamed through seven vendor wire
//! protocols: OpenAI Chat Completions and Responses, Anthropic Messages,
//! Google Generative AI, Cloud Code Assist, Vertex AI and Bedrock Converse.
//!
//! ```no_run
//! use switchyard_core::{Api, Context, Message, Model, StreamOptions, Switchyard};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let yard = Switchyard::new()?;
//! let model = Model::new("gpt-4o", Api::OpenAiCompletions, "openai", "https://api.openai.com/v1");
//! let context = Context::new(vec![Message::user("Hello")]);
//! let message = yard.complete(&model, context, StreamOptions::default()).await;
//! println!("{}", message.text());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod http;
pub mod protocol;
pub mod providers;
pub mod stream;

pub use protocol::{
    Api, AssistantMessage, AssistantMessageEvent, CacheRetention, ContentBlock, Context, Message,
    Model, SimpleStreamOptions, StopReason, StreamOptions, ThinkingLevel, Tool, ToolCall,
    ToolChoice, Usage,
};
pub use providers::{adapter_for, ProviderError, ProviderResult, RetryPolicy, Switchyard};
pub use stream::AssistantMessageEventStream;

/// Returns the version of the Switchyard Core library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
