//! Per-call stream driver
//!
//! One spawned task per call. The task resolves credentials, transforms the
//! history, runs the adapter (re-issuing empty Google streams) and emits the
//! single terminal event. Every suspension point races the call's
//! cancellation token.

use crate::http::HttpClient;
use crate::protocol::{Context, Model, StopReason, StreamOptions};
use crate::providers::adapter::{AdapterRequest, ApiAdapter, ToolCallCounter};
use crate::providers::credentials::CredentialResolver;
use crate::providers::error::{ProviderError, ProviderResult};
use crate::providers::options::VendorOptions;
use crate::providers::retry::{sleep_abortable, RetryPolicy};
use crate::providers::transform::transform_messages;
use crate::stream::{event_channel, AssistantMessageEventStream, EventSink};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};

/// Inputs for one call, before credentials are known
pub(crate) struct Call {
    pub model: Arc<Model>,
    pub context: Context,
    pub options: StreamOptions,
    pub vendor: VendorOptions,
    pub http: HttpClient,
    pub retry: RetryPolicy,
    pub tool_call_ids: Arc<ToolCallCounter>,
}

/// Spawn the producing task and return the consumer stream
///
/// Must be called from within a tokio runtime.
pub(crate) fn spawn(
    adapter: &'static dyn ApiAdapter,
    resolver: Arc<CredentialResolver>,
    call: Call,
) -> AssistantMessageEventStream {
    // A child token lets `end()` stop this call without firing the caller's token.
    let signal = call
        .options
        .signal
        .as_ref()
        .map(CancellationToken::child_token)
        .unwrap_or_default();
    let (mut sink, stream) = event_channel(Arc::clone(&call.model), signal.clone());

    let span = info_span!(
        "stream",
        api = %call.model.api,
        provider = %call.model.provider,
        model = %call.model.id
    );
    tokio::spawn(
        async move {
            drive(adapter, &resolver, call, signal, &mut sink).await;
        }
        .instrument(span),
    );
    stream
}

async fn drive(
    adapter: &'static dyn ApiAdapter,
    resolver: &CredentialResolver,
    call: Call,
    signal: CancellationToken,
    sink: &mut EventSink,
) {
    sink.start();

    let credential = tokio::select! {
        biased;
        _ = signal.cancelled() => Err(ProviderError::Aborted),
        result = resolver.resolve(&call.model, call.options.api_key.as_deref()) => result,
    };
    let credential = match credential {
        Ok(credential) => credential,
        Err(error) => {
            sink.fail(&error);
            return;
        }
    };

    let context = Context {
        messages: transform_messages(&call.context.messages, &call.model),
        ..call.context
    };
    let request = AdapterRequest {
        model: call.model,
        context,
        options: call.options,
        vendor: call.vendor,
        credential,
        http: call.http,
        retry: call.retry,
        signal: signal.clone(),
        tool_call_ids: call.tool_call_ids,
    };

    match run_with_empty_retries(adapter, &request, sink).await {
        Ok(reason) => sink.finish(reason),
        Err(error) => {
            let error = if signal.is_cancelled() {
                ProviderError::Aborted
            } else {
                error
            };
            sink.fail(&error);
        }
    }
}

async fn run_with_empty_retries(
    adapter: &dyn ApiAdapter,
    request: &AdapterRequest,
    sink: &mut EventSink,
) -> ProviderResult<StopReason> {
    let max_empty = if adapter.retries_empty_streams() {
        request.retry.max_empty_stream_retries
    } else {
        0
    };
    let mut empty_attempts = 0u32;

    loop {
        let result = tokio::select! {
            biased;
            _ = request.signal.cancelled() => Err(ProviderError::Aborted),
            result = adapter.stream(request, sink) => result,
        };
        let reason = result?;
        if !adapter.retries_empty_streams() || !sink.is_empty() {
            return Ok(reason);
        }

        empty_attempts += 1;
        if empty_attempts > max_empty {
            return Err(ProviderError::EmptyResponse {
                attempts: empty_attempts,
            });
        }
        let delay = request.retry.empty_stream_delay(empty_attempts - 1);
        warn!(
            attempt = empty_attempts,
            max_empty_stream_retries = max_empty,
            delay_ms = delay.as_millis() as u64,
            "empty response, re-issuing request"
        );
        sleep_abortable(delay, &request.signal).await?;
        sink.reset();
        debug!("installed fresh accumulator");
    }
}
