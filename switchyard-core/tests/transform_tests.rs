//! History transformer: pairing repair, foreign-turn conversion and idempotency

use proptest::prelude::*;
use serde_json::Map;
use std::collections::HashSet;
use switchyard_core::protocol::{AssistantMessage, ThinkingContent, ToolResultMessage};
use switchyard_core::providers::transform::{ABORTED_RESULT_TEXT, NO_RESULT_TEXT};
use switchyard_core::providers::transform_messages;
use switchyard_core::{Api, ContentBlock, Message, Model, StopReason};
use test_case::test_case;

fn claude() -> Model {
    Model::new("claude-sonnet-4-5", Api::AnthropicMessages, "anthropic", "https://api.anthropic.com")
}

fn assistant(api: Api, provider: &str, stop: StopReason, content: Vec<ContentBlock>) -> Message {
    let mut message = AssistantMessage::empty(api, provider, "m");
    message.stop_reason = stop;
    message.content = content;
    message.timestamp = 1_000;
    Message::Assistant(message)
}

fn call(id: &str) -> ContentBlock {
    ContentBlock::tool_call(id, "bash", Map::new())
}

fn result(id: &str, text: &str) -> Message {
    Message::ToolResult(ToolResultMessage::text(id, "bash", text, false))
}

fn results_for<'a>(messages: &'a [Message], id: &str) -> Vec<&'a ToolResultMessage> {
    messages
        .iter()
        .filter_map(|message| match message {
            Message::ToolResult(result) if result.tool_call_id == id => Some(result),
            _ => None,
        })
        .collect()
}

#[test]
fn test_missing_result_synthesized_before_next_user_turn() {
    let history = vec![
        Message::user("run it"),
        assistant(Api::AnthropicMessages, "anthropic", StopReason::ToolUse, vec![call("toolu_1"), call("toolu_2")]),
        result("toolu_1", "ok"),
        Message::user("never mind"),
    ];
    let out = transform_messages(&history, &claude());

    assert_eq!(out.len(), 5);
    let Message::ToolResult(synthetic) = &out[3] else {
        panic!("expected synthetic result, got {:?}", out[3]);
    };
    assert_eq!(synthetic.tool_call_id, "toolu_2");
    assert!(synthetic.is_error);
    assert_eq!(synthetic.text_content(), NO_RESULT_TEXT);
    assert_eq!(synthetic.timestamp, 1_000);
    assert!(matches!(out[4], Message::User(_)));
}

#[test]
fn test_aborted_turn_gets_immediate_results() {
    let history = vec![
        Message::user("run it"),
        assistant(Api::AnthropicMessages, "anthropic", StopReason::Aborted, vec![call("toolu_1")]),
        Message::user("try again"),
    ];
    let out = transform_messages(&history, &claude());

    let Message::ToolResult(synthetic) = &out[2] else {
        panic!("expected synthetic result");
    };
    assert_eq!(synthetic.text_content(), ABORTED_RESULT_TEXT);
    assert_eq!(results_for(&out, "toolu_1").len(), 1);
}

#[test]
fn test_failed_turn_defers_to_real_results() {
    let history = vec![
        Message::user("run it"),
        assistant(Api::AnthropicMessages, "anthropic", StopReason::Error, vec![call("toolu_1"), call("toolu_2")]),
        result("toolu_2", "real output"),
    ];
    let out = transform_messages(&history, &claude());

    let first = results_for(&out, "toolu_1");
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].text_content(), ABORTED_RESULT_TEXT);
    let second = results_for(&out, "toolu_2");
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].text_content(), "real output");
}

#[test]
fn test_result_after_next_user_turn_does_not_duplicate() {
    let history = vec![
        Message::user("run it"),
        assistant(Api::AnthropicMessages, "anthropic", StopReason::Aborted, vec![call("toolu_1")]),
        Message::user("what happened?"),
        result("toolu_1", "late output"),
    ];
    let out = transform_messages(&history, &claude());

    let results = results_for(&out, "toolu_1");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].text_content(), ABORTED_RESULT_TEXT);
    assert!(matches!(out[2], Message::ToolResult(_)));
    assert_eq!(out.len(), 4);
}

#[test]
fn test_orphan_and_duplicate_results_dropped() {
    let history = vec![
        result("toolu_0", "before any call"),
        Message::user("run it"),
        assistant(Api::AnthropicMessages, "anthropic", StopReason::ToolUse, vec![call("toolu_1")]),
        result("toolu_1", "first"),
        result("toolu_1", "again"),
    ];
    let out = transform_messages(&history, &claude());

    assert!(results_for(&out, "toolu_0").is_empty());
    let results = results_for(&out, "toolu_1");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].text_content(), "first");
}

#[test]
fn test_empty_failed_turn_dropped() {
    let history = vec![
        Message::user("hi"),
        assistant(Api::OpenAiCompletions, "openai", StopReason::Error, vec![]),
        Message::user("hello?"),
    ];
    let out = transform_messages(&history, &claude());
    assert_eq!(out.len(), 2);
    assert!(out.iter().all(|message| matches!(message, Message::User(_))));
}

#[test_case("call_abc|fc_1", "call_abcfc_1"; "responses composite id")]
#[test_case("call:with/punct", "callwithpunct"; "punctuation stripped")]
fn test_foreign_ids_normalized_with_results(original: &str, expected: &str) {
    let history = vec![
        Message::user("go"),
        assistant(Api::OpenAiResponses, "openai", StopReason::ToolUse, vec![call(original)]),
        result(original, "done"),
    ];
    let out = transform_messages(&history, &claude());

    let Message::Assistant(converted) = &out[1] else {
        panic!("expected assistant");
    };
    assert_eq!(converted.tool_calls().next().unwrap().id, expected);
    assert_eq!(results_for(&out, expected).len(), 1);
    assert!(results_for(&out, original).is_empty());
}

#[test]
fn test_same_origin_keeps_signatures() {
    let thinking = ContentBlock::Thinking(ThinkingContent {
        thinking: "plan".into(),
        thinking_signature: Some("sig".into()),
        redacted: false,
    });
    let history = vec![
        Message::user("go"),
        assistant(Api::AnthropicMessages, "anthropic", StopReason::Stop, vec![thinking.clone()]),
    ];
    let out = transform_messages(&history, &claude());
    let Message::Assistant(kept) = &out[1] else {
        panic!("expected assistant");
    };
    assert_eq!(kept.content, vec![thinking]);
}

#[test]
fn test_redacted_foreign_thinking_dropped() {
    let history = vec![assistant(
        Api::AnthropicMessages,
        "anthropic",
        StopReason::Stop,
        vec![
            ContentBlock::Thinking(ThinkingContent {
                thinking: String::new(),
                thinking_signature: Some("opaque".into()),
                redacted: true,
            }),
            ContentBlock::text("answer"),
        ],
    )];
    let gemini = Model::new("gemini-2.5-pro", Api::GoogleGenerativeAi, "google", "https://example.com");
    let out = transform_messages(&history, &gemini);
    let Message::Assistant(converted) = &out[0] else {
        panic!("expected assistant");
    };
    assert_eq!(converted.content, vec![ContentBlock::text("answer")]);
}

const IDS: [&str; 4] = ["toolu_1", "call_a|fc_1", "x:y", "call_b"];

fn arb_block() -> impl Strategy<Value = ContentBlock> {
    prop_oneof![
        "[a-z ]{0,8}".prop_map(ContentBlock::text),
        ("[a-z ]{0,8}", any::<bool>(), any::<bool>()).prop_map(|(text, signed, redacted)| {
            ContentBlock::Thinking(ThinkingContent {
                thinking: text,
                thinking_signature: signed.then(|| "sig".to_string()),
                redacted,
            })
        }),
        (0..IDS.len()).prop_map(|i| call(IDS[i])),
    ]
}

fn arb_message() -> impl Strategy<Value = Message> {
    let origin = prop_oneof![
        Just((Api::AnthropicMessages, "anthropic")),
        Just((Api::OpenAiResponses, "openai")),
        Just((Api::GoogleGenerativeAi, "google")),
    ];
    let stop = prop_oneof![
        Just(StopReason::Stop),
        Just(StopReason::ToolUse),
        Just(StopReason::Error),
        Just(StopReason::Aborted),
    ];
    prop_oneof![
        "[a-z]{1,6}".prop_map(Message::user),
        (origin, stop, prop::collection::vec(arb_block(), 0..4))
            .prop_map(|((api, provider), stop, content)| assistant(api, provider, stop, content)),
        (0..IDS.len()).prop_map(|i| result(IDS[i], "out")),
    ]
}

proptest! {
    #[test]
    fn prop_transform_is_idempotent(history in prop::collection::vec(arb_message(), 0..10)) {
        for model in [claude(), Model::new("gpt-4o", Api::OpenAiCompletions, "openai", "https://api.openai.com/v1")] {
            let once = transform_messages(&history, &model);
            let twice = transform_messages(&once, &model);
            prop_assert_eq!(&once, &twice);
        }
    }

    #[test]
    fn prop_every_call_answered_exactly_once(history in prop::collection::vec(arb_message(), 0..10)) {
        let out = transform_messages(&history, &claude());
        let mut answered = 0usize;
        for (position, message) in out.iter().enumerate() {
            let Message::Assistant(turn) = message else { continue };
            let window: Vec<&str> = out[position + 1..]
                .iter()
                .map_while(|m| match m {
                    Message::ToolResult(result) => Some(result.tool_call_id.as_str()),
                    _ => None,
                })
                .collect();
            let ids: HashSet<&str> = turn.tool_calls().map(|call| call.id.as_str()).collect();
            for id in &ids {
                let count = window.iter().filter(|result| *result == id).count();
                prop_assert_eq!(count, 1, "call {} answered {} times in {:?}", id, count, out);
            }
            prop_assert_eq!(window.len(), ids.len());
            answered += window.len();
        }
        let results = out.iter().filter(|m| matches!(m, Message::ToolResult(_))).count();
        prop_assert_eq!(results, answered);
    }
}
