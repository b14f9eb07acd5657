//! HTTP layer shared by the REST adapters
//!
//! This module handles:
//! - Connection pooling and client management
//! - Retried request sending with vendor-suggested delays
//! - Error envelope extraction
//! - Server-sent event decoding

pub mod client;
pub mod error;
pub mod sse;

pub use client::{HttpClient, StreamRequest};
pub use error::{extract_error_message, map_http_error, message_from_json};
pub use sse::{parse_data, sse_events, SseStream};

/// Join a base URL and a path without doubling the slash
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("https://api.openai.com/v1/", "/chat/completions"), "https://api.openai.com/v1/chat/completions");
        assert_eq!(join_url("http://localhost:8080", "v1/messages"), "http://localhost:8080/v1/messages");
    }
}
