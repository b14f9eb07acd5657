//! HTTP error mapping utilities

use crate::providers::error::ProviderError;
use crate::providers::retry::extract_retry_delay_with_margin;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

/// Longest raw body kept in an error message
const MAX_RAW_MESSAGE: usize = 1_000;

/// Map a failed response to a [`ProviderError`]
///
/// The message is the cleaned vendor text; `retry_after` carries any delay
/// the vendor suggested, already padded by `margin`.
pub fn map_http_error(status: StatusCode, headers: &HeaderMap, body: &str, margin: Duration) -> ProviderError {
    let message = extract_error_message(body)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown error").to_string());
    ProviderError::Http {
        status: status.as_u16(),
        message,
        retry_after: extract_retry_delay_with_margin(body, headers, margin),
    }
}

/// Human-readable message from a vendor error body
///
/// Understands the OpenAI/Anthropic `{"error": {"message"}}` envelope,
/// Google's array-wrapped variant, bare `{"message"}`/`{"detail"}` and
/// string-valued `error`; anything else falls back to the raw text.
pub fn extract_error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(json) = serde_json::from_str::<Value>(trimmed) {
        if let Some(message) = message_from_json(&json) {
            return Some(message);
        }
    }

    let mut raw: String = trimmed.chars().take(MAX_RAW_MESSAGE).collect();
    if raw.len() < trimmed.len() {
        raw.push_str("...");
    }
    Some(raw)
}

/// Message from a parsed error envelope
pub fn message_from_json(json: &Value) -> Option<String> {
    if let Some(first) = json.as_array().and_then(|items| items.first()) {
        return message_from_json(first);
    }

    let error = json.get("error");
    let candidates = [
        error.and_then(|e| e.get("message")),
        error.filter(|e| e.is_string()),
        json.get("message"),
        json.get("detail"),
        error.and_then(|e| e.get("type")),
    ];
    candidates
        .into_iter()
        .flatten()
        .find_map(|value| value.as_str())
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(r#"{"error": {"message": "Invalid API key", "type": "auth"}}"#, "Invalid API key"; "openai envelope")]
    #[test_case(r#"[{"error": {"code": 429, "message": "Resource exhausted", "status": "RESOURCE_EXHAUSTED"}}]"#, "Resource exhausted"; "google array")]
    #[test_case(r#"{"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}}"#, "Overloaded"; "anthropic envelope")]
    #[test_case(r#"{"error": "model not found"}"#, "model not found"; "string error")]
    #[test_case(r#"{"detail": "Not Found"}"#, "Not Found"; "detail")]
    #[test_case("upstream connect error", "upstream connect error"; "raw text")]
    fn test_extract_error_message(body: &str, expected: &str) {
        assert_eq!(extract_error_message(body).as_deref(), Some(expected));
    }

    #[test]
    fn test_empty_body_uses_status_reason() {
        let err = map_http_error(
            StatusCode::SERVICE_UNAVAILABLE,
            &HeaderMap::new(),
            "",
            Duration::from_secs(1),
        );
        assert_eq!(err.to_string(), "HTTP 503: Service Unavailable");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_long_raw_body_is_truncated() {
        let body = "x".repeat(5_000);
        let message = extract_error_message(&body).unwrap();
        assert_eq!(message.len(), MAX_RAW_MESSAGE + 3);
    }
}
