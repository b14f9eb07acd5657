//! Generative Language API adapter (`generativelanguage.googleapis.com`)

use super::converter::to_generate_request;
use super::streaming::Envelope;
use super::{run, with_extra_headers};
use crate::http::{join_url, StreamRequest};
use crate::protocol::{Api, StopReason};
use crate::providers::adapter::{AdapterRequest, ApiAdapter};
use crate::providers::credentials::Credential;
use crate::providers::error::{ProviderError, ProviderResult};
use crate::stream::EventSink;
use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, Default)]
pub struct GoogleGenerativeAdapter;

#[async_trait]
impl ApiAdapter for GoogleGenerativeAdapter {
    fn api(&self) -> Api {
        Api::GoogleGenerativeAi
    }

    fn retries_empty_streams(&self) -> bool {
        true
    }

    async fn stream(&self, request: &AdapterRequest, sink: &mut EventSink) -> ProviderResult<StopReason> {
        let Credential::ApiKey(key) = &request.credential else {
            return Err(ProviderError::InvalidCredentials {
                provider: request.model.provider.clone(),
                message: format!("expected an API key, got {}", request.credential.kind()),
            });
        };

        let body = Value::Object(to_generate_request(request));
        request.emit_payload(&body);

        let url = join_url(
            &request.model.base_url,
            &format!("models/{}:streamGenerateContent?alt=sse", request.model.id),
        );
        let http_request = StreamRequest::new(url, body).header("x-goog-api-key", key.expose_secret());
        run(request, with_extra_headers(request, http_request), Envelope::Plain, sink).await
    }
}
