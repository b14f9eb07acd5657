//! Shared helpers for the wiremock-driven stream tests

#![allow(dead_code)]

use futures::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use switchyard_core::config::SwitchyardConfig;
use switchyard_core::{AssistantMessageEvent, AssistantMessageEventStream, RetryPolicy, Switchyard};
use wiremock::ResponseTemplate;

/// Retry policy with millisecond delays
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 3,
        base_delay_ms: 5,
        max_empty_stream_retries: 2,
        empty_stream_base_delay_ms: 5,
        server_delay_margin_ms: 0,
        max_retry_delay_ms: 60_000,
        jitter_factor: 0.0,
    }
}

/// Route crate logs to the test output, filtered by `RUST_LOG`
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Factory with a fixed environment and the fast retry policy
pub fn yard(env: &[(&str, &str)]) -> Switchyard {
    init_logging();
    let env: HashMap<String, String> = env.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    let config = SwitchyardConfig {
        retry: fast_retry(),
        ..SwitchyardConfig::default()
    };
    Switchyard::from_config(config)
        .unwrap()
        .with_env(Arc::new(move |name: &str| env.get(name).cloned()))
}

/// Body of an SSE response carrying one `data:` line per payload
pub fn sse_body(payloads: &[Value]) -> String {
    payloads.iter().map(|payload| format!("data: {payload}\n\n")).collect()
}

/// Anthropic-style SSE with `event:` names taken from each payload's type
pub fn named_sse_body(payloads: &[Value]) -> String {
    payloads
        .iter()
        .map(|payload| {
            let name = payload["type"].as_str().unwrap_or("message");
            format!("event: {name}\ndata: {payload}\n\n")
        })
        .collect()
}

pub fn sse_response(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")
}

/// Drain a stream into its events
pub async fn collect(mut stream: AssistantMessageEventStream) -> Vec<AssistantMessageEvent> {
    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        events.push(event);
    }
    events
}

pub fn kinds(events: &[AssistantMessageEvent]) -> Vec<&'static str> {
    events.iter().map(AssistantMessageEvent::kind).collect()
}

/// Check the ordering rules every stream obeys
///
/// One `start` first, exactly one terminal event last, blocks opened at
/// consecutive indices and never interleaved.
pub fn assert_well_formed(events: &[AssistantMessageEvent]) {
    assert!(!events.is_empty(), "no events");
    assert_eq!(events[0].kind(), "start", "first event must be start");
    let terminals = events.iter().filter(|event| event.is_terminal()).count();
    assert_eq!(terminals, 1, "exactly one terminal event: {:?}", kinds(events));
    assert!(events.last().unwrap().is_terminal(), "terminal event must be last");

    let mut next_index = 0usize;
    let mut open: Option<usize> = None;
    for event in &events[1..events.len() - 1] {
        let kind = event.kind();
        let index = event.content_index().expect("block event carries an index");
        if kind.ends_with("_start") {
            assert_eq!(open, None, "block {index} opened while another is open");
            assert_eq!(index, next_index, "blocks open at consecutive indices");
            open = Some(index);
            next_index += 1;
        } else if kind.ends_with("_end") {
            assert_eq!(open, Some(index), "{kind} for a block that is not open");
            open = None;
        } else {
            assert_eq!(open, Some(index), "{kind} for a block that is not open");
        }
    }
    assert_eq!(open, None, "a block was left open before the terminal event");
}
