//! Consumer side of the canonical event stream
//!
//! A call returns an [`AssistantMessageEventStream`]: a single-consumer,
//! ordered `Stream` of [`AssistantMessageEvent`]s fed by the adapter task
//! through an [`EventSink`].

pub mod partial_json;
pub mod sink;

pub use partial_json::parse_partial_json;
pub use sink::{BlockKind, EventSink};

use crate::protocol::{AssistantMessage, AssistantMessageEvent, Model, PartialMessage, StopReason};
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Ordered event stream for one request
pub struct AssistantMessageEventStream {
    rx: mpsc::UnboundedReceiver<AssistantMessageEvent>,
    cancel: CancellationToken,
    partial: PartialMessage,
}

/// Create a connected sink/stream pair
///
/// `cancel` is the token the producing task watches; [`end`] fires it.
///
/// [`end`]: AssistantMessageEventStream::end
pub fn event_channel(model: Arc<Model>, cancel: CancellationToken) -> (EventSink, AssistantMessageEventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sink = EventSink::new(model, tx);
    let stream = AssistantMessageEventStream {
        rx,
        cancel,
        partial: sink.partial(),
    };
    (sink, stream)
}

impl AssistantMessageEventStream {
    /// Handle onto the message being built
    pub fn partial(&self) -> &PartialMessage {
        &self.partial
    }

    /// Await the terminal event and return its message
    ///
    /// Events not yet consumed are drained. If the producer vanished without
    /// a terminal event the current snapshot is returned as an error.
    pub async fn result(mut self) -> AssistantMessage {
        while let Some(event) = self.rx.recv().await {
            if let Some(message) = event.terminal_message() {
                return message.clone();
            }
        }
        let mut message = self.partial.snapshot();
        if !self.partial.is_finalized() {
            message.stop_reason = StopReason::Error;
            message.error_message = Some("Stream ended without a terminal event".to_string());
        }
        message
    }

    /// Close the stream and cancel the producing task
    pub fn end(&mut self) {
        self.cancel.cancel();
        self.rx.close();
    }
}

impl Stream for AssistantMessageEventStream {
    type Item = AssistantMessageEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for AssistantMessageEventStream {
    fn drop(&mut self) {
        if !self.partial.is_finalized() {
            self.cancel.cancel();
        }
    }
}
