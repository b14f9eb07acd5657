//! Chat-completions adapter

use super::converter::to_chat_request;
use super::streaming::consume;
use super::bearer_request;
use crate::http::{join_url, sse_events};
use crate::protocol::{Api, StopReason};
use crate::providers::adapter::{AdapterRequest, ApiAdapter};
use crate::providers::error::ProviderResult;
use crate::stream::EventSink;
use async_trait::async_trait;
use tracing::debug;

/// Adapter for OpenAI-compatible `/chat/completions` servers
#[derive(Debug, Default)]
pub struct OpenAiCompletionsAdapter;

#[async_trait]
impl ApiAdapter for OpenAiCompletionsAdapter {
    fn api(&self) -> Api {
        Api::OpenAiCompletions
    }

    async fn stream(&self, request: &AdapterRequest, sink: &mut EventSink) -> ProviderResult<StopReason> {
        let body = serde_json::to_value(to_chat_request(request))?;
        request.emit_payload(&body);

        let url = join_url(&request.model.base_url, "chat/completions");
        let http_request = bearer_request(request, url, body)?;
        let outcome = request
            .http
            .post_stream(&http_request, &request.retry, &request.signal)
            .await?;
        debug!(attempts = outcome.attempts, "chat completions stream opened");

        consume(sse_events(outcome.value), sink, &request.tool_call_ids).await
    }
}
