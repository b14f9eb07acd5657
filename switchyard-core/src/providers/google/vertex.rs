//! Vertex AI adapter

use super::converter::to_generate_request;
use super::streaming::Envelope;
use super::{run, with_extra_headers};
use crate::http::{join_url, StreamRequest};
use crate::protocol::{Api, Model, StopReason};
use crate::providers::adapter::{AdapterRequest, ApiAdapter};
use crate::providers::credentials::Credential;
use crate::providers::error::{ProviderError, ProviderResult};
use crate::stream::EventSink;
use async_trait::async_trait;
use serde_json::Value;

/// Global endpoint used with Vertex API keys
const VERTEX_GLOBAL_HOST: &str = "https://aiplatform.googleapis.com";

#[derive(Debug, Default)]
pub struct VertexAdapter;

/// Regional base URL; `{location}` in a configured base is substituted
fn regional_base(model: &Model, location: &str) -> String {
    if model.base_url.is_empty() {
        format!("https://{location}-aiplatform.googleapis.com")
    } else {
        model.base_url.replace("{location}", location)
    }
}

/// Streaming URL for a project-scoped call
pub fn project_url(model: &Model, project: &str, location: &str) -> String {
    join_url(
        &regional_base(model, location),
        &format!(
            "v1/projects/{project}/locations/{location}/publishers/google/models/{}:streamGenerateContent?alt=sse",
            model.id
        ),
    )
}

/// Streaming URL for an API-key call
pub fn express_url(model: &Model) -> String {
    let base = if model.base_url.is_empty() || model.base_url.contains("{location}") {
        VERTEX_GLOBAL_HOST
    } else {
        model.base_url.as_str()
    };
    join_url(
        base,
        &format!("v1/publishers/google/models/{}:streamGenerateContent?alt=sse", model.id),
    )
}

#[async_trait]
impl ApiAdapter for VertexAdapter {
    fn api(&self) -> Api {
        Api::GoogleVertex
    }

    fn retries_empty_streams(&self) -> bool {
        true
    }

    async fn stream(&self, request: &AdapterRequest, sink: &mut EventSink) -> ProviderResult<StopReason> {
        let body = Value::Object(to_generate_request(request));
        request.emit_payload(&body);

        let http_request = match &request.credential {
            Credential::GoogleCloud {
                access_token,
                project,
                location,
            } => StreamRequest::new(project_url(&request.model, project, location), body)
                .header("Authorization", format!("Bearer {}", access_token.expose_secret()))
                .header("x-goog-user-project", project.as_str()),
            Credential::ApiKey(key) => {
                StreamRequest::new(express_url(&request.model), body).header("x-goog-api-key", key.expose_secret())
            }
            other => {
                return Err(ProviderError::InvalidCredentials {
                    provider: request.model.provider.clone(),
                    message: format!("{} credentials are not accepted by Vertex AI", other.kind()),
                })
            }
        };

        run(request, with_extra_headers(request, http_request), Envelope::Plain, sink).await
    }
}
