//! Gemini-family adapters
//!
//! The public Generative Language API, Vertex AI and Cloud Code Assist
//! (Gemini CLI and Antigravity) all speak the same `GenerateContent` body;
//! they differ in endpoint, authentication and, for Cloud Code Assist, an
//! outer request/response envelope.

pub mod converter;
pub mod gemini_cli;
pub mod generative;
pub mod streaming;
pub mod types;
pub mod vertex;

pub use gemini_cli::GeminiCliAdapter;
pub use generative::GoogleGenerativeAdapter;
pub use vertex::VertexAdapter;

use crate::http::{sse_events, StreamRequest};
use crate::protocol::StopReason;
use crate::providers::adapter::AdapterRequest;
use crate::providers::error::ProviderResult;
use crate::stream::EventSink;
use streaming::{consume, Envelope};
use tracing::debug;

/// Open the stream and feed it into `sink`
pub(crate) async fn run(
    request: &AdapterRequest,
    http_request: StreamRequest,
    envelope: Envelope,
    sink: &mut EventSink,
) -> ProviderResult<StopReason> {
    let outcome = request
        .http
        .post_stream(&http_request, &request.retry, &request.signal)
        .await?;
    debug!(attempts = outcome.attempts, api = %request.model.api, "gemini stream opened");

    consume(
        request.model.api,
        sse_events(outcome.value),
        envelope,
        sink,
        &request.tool_call_ids,
    )
    .await
}

/// `StreamRequest` with model and request headers applied
pub(crate) fn with_extra_headers(request: &AdapterRequest, http_request: StreamRequest) -> StreamRequest {
    let extra = request.extra_headers();
    http_request.headers(extra.iter().map(|(name, value)| (name, value)))
}
