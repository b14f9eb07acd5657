//! AWS Bedrock adapter using the Converse streaming API
//!
//! The SDK client runs with its own retries disabled; throttling and
//! availability errors are mapped onto HTTP statuses so the shared retry
//! executor handles them like every other vendor.

mod input;
mod output;

pub use input::{build_body, json_to_document, to_converse_parts, ConverseParts};
pub use output::{apply_event, map_stop_reason, usage_from_tokens};

use crate::protocol::{Api, StopReason};
use crate::providers::adapter::{AdapterRequest, ApiAdapter};
use crate::providers::credentials::Credential;
use crate::providers::error::{ProviderError, ProviderResult};
use crate::providers::retry::RetryExecutor;
use crate::stream::EventSink;
use async_trait::async_trait;
use aws_sdk_bedrockruntime::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_bedrockruntime::Client as BedrockRuntimeClient;
use tracing::{debug, error};

#[derive(Debug, Default)]
pub struct BedrockAdapter;

/// Build a runtime client, honouring a non-AWS base URL as endpoint override
fn client_for(request: &AdapterRequest) -> ProviderResult<BedrockRuntimeClient> {
    let Credential::Aws(sdk_config) = &request.credential else {
        return Err(ProviderError::InvalidCredentials {
            provider: request.model.provider.clone(),
            message: format!("{} credentials cannot sign Bedrock requests", request.credential.kind()),
        });
    };

    let base_url = request.model.base_url.as_str();
    let mut builder = aws_sdk_bedrockruntime::config::Builder::from(sdk_config);
    if !base_url.is_empty() && !base_url.contains("amazonaws.com") {
        debug!(endpoint = base_url, "using custom Bedrock endpoint");
        builder = builder.endpoint_url(base_url);
    }
    Ok(BedrockRuntimeClient::from_conf(builder.build()))
}

/// Map SDK errors onto the shared taxonomy
pub fn handle_bedrock_error<E, R>(error: SdkError<E, R>) -> ProviderError
where
    E: ProvideErrorMetadata + std::fmt::Debug,
    R: std::fmt::Debug,
{
    match &error {
        SdkError::ServiceError(service_error) => {
            let err = service_error.err();
            let message = err.message().unwrap_or("Unknown error").to_string();
            match err.code() {
                Some("ThrottlingException") => ProviderError::http(429, message),
                Some("ServiceUnavailableException") => ProviderError::http(503, message),
                Some("ModelTimeoutException") => ProviderError::http(504, message),
                Some("InternalServerException") | Some("ModelStreamErrorException") => {
                    ProviderError::http(500, message)
                }
                Some("AccessDeniedException") | Some("UnrecognizedClientException") => {
                    ProviderError::InvalidCredentials {
                        provider: "amazon-bedrock".to_string(),
                        message,
                    }
                }
                Some("ValidationException") => ProviderError::http(400, message),
                Some("ResourceNotFoundException") => ProviderError::http(404, message),
                _ => ProviderError::http(500, message),
            }
        }
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            ProviderError::Transport(format!("{error:?}"))
        }
        _ => ProviderError::Configuration(format!("{error:?}")),
    }
}

#[async_trait]
impl ApiAdapter for BedrockAdapter {
    fn api(&self) -> Api {
        Api::BedrockConverseStream
    }

    async fn stream(&self, request: &AdapterRequest, sink: &mut EventSink) -> ProviderResult<StopReason> {
        let body = build_body(request);
        request.emit_payload(&body);
        let parts = to_converse_parts(&body)?;
        let client = client_for(request)?;

        let (client, parts) = (&client, &parts);
        let output = RetryExecutor::new(request.retry.clone())
            .execute(&request.signal, || async move {
                client
                    .converse_stream()
                    .model_id(request.model.id.clone())
                    .set_messages(Some(parts.messages.clone()))
                    .set_system(parts.system.clone())
                    .set_inference_config(parts.inference_config.clone())
                    .set_tool_config(parts.tool_config.clone())
                    .set_additional_model_request_fields(parts.additional_fields.clone())
                    .send()
                    .await
                    .map_err(handle_bedrock_error)
            })
            .await?
            .value;
        debug!(model = %request.model.id, "converse stream opened");

        let mut events = output.stream;
        let mut stop = None;
        loop {
            match events.recv().await {
                Ok(Some(event)) => apply_event(event, sink, &mut stop)?,
                Ok(None) => break,
                Err(e) => {
                    error!("Bedrock stream error: {e:?}");
                    return Err(handle_bedrock_error(e));
                }
            }
        }
        Ok(stop.unwrap_or(StopReason::Stop))
    }
}
