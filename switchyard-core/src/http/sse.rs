//! Server-sent event decoding for streaming responses

use crate::providers::error::{ProviderError, ProviderResult};
use eventsource_stream::{Event, Eventsource};
use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use std::pin::Pin;

/// Boxed stream of decoded SSE events
pub type SseStream = Pin<Box<dyn Stream<Item = ProviderResult<Event>> + Send>>;

/// Decode a streaming response body into SSE events
///
/// Read failures surface as transport errors naming the cause.
pub fn sse_events(response: reqwest::Response) -> SseStream {
    Box::pin(response.bytes_stream().eventsource().map(|result| {
        result.map_err(|e| match e {
            eventsource_stream::EventStreamError::Transport(err) => {
                crate::providers::error::transport_error(&err)
            }
            other => ProviderError::Parse(format!("Stream error: {other}")),
        })
    }))
}

/// Parse an event's data payload, `None` for the `[DONE]` sentinel
pub fn parse_data<T: DeserializeOwned>(event: &Event) -> ProviderResult<Option<T>> {
    let data = event.data.trim();
    if data.is_empty() || data == "[DONE]" {
        return Ok(None);
    }
    serde_json::from_str(data)
        .map(Some)
        .map_err(|e| ProviderError::Parse(format!("{e} in chunk: {}", truncate(data, 200))))
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
