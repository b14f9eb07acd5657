//! OpenAI-style adapters: chat completions and the responses API

pub mod client;
pub mod converter;
pub mod responses;
pub mod streaming;
pub mod types;

pub use client::OpenAiCompletionsAdapter;
pub use responses::OpenAiResponsesAdapter;

use crate::http::StreamRequest;
use crate::protocol::ImageContent;
use crate::providers::adapter::AdapterRequest;
use crate::providers::error::{ProviderError, ProviderResult};
use serde_json::Value;

/// Inline image as a `data:` URL
pub(crate) fn data_url(image: &ImageContent) -> String {
    format!("data:{};base64,{}", image.mime_type, image.data)
}

/// POST with `Authorization: Bearer`, model and request headers applied
pub(crate) fn bearer_request(request: &AdapterRequest, url: String, body: Value) -> ProviderResult<StreamRequest> {
    let token = request
        .credential
        .bearer()
        .ok_or_else(|| ProviderError::InvalidCredentials {
            provider: request.model.provider.clone(),
            message: format!(
                "{} credentials cannot be used as a bearer token",
                request.credential.kind()
            ),
        })?;
    let extra = request.extra_headers();
    Ok(StreamRequest::new(url, body)
        .header("Authorization", format!("Bearer {token}"))
        .headers(extra.iter().map(|(name, value)| (name, value))))
}
