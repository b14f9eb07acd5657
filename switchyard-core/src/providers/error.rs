//! Provider error types and handling

use crate::protocol::Api;
use std::error::Error as StdError;
use std::time::Duration;
use thiserror::Error;

use super::retry::{is_retryable_status, is_retryable_text};

/// Result type for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors that can occur when talking to an LLM vendor
///
/// Adapters never return these to callers directly: every failure becomes a
/// terminal `error` event whose `error_message` is this error's `Display`.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// No credential could be resolved
    #[error("No API key found for provider \"{provider}\". {remediation}")]
    MissingCredentials {
        provider: String,
        remediation: String,
    },

    /// A credential was found but cannot be used
    #[error("{message}")]
    InvalidCredentials { provider: String, message: String },

    /// Vendor answered with a non-success status
    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        message: String,
        retry_after: Option<Duration>,
    },

    /// Connection-level failure; the message names the underlying cause
    #[error("Network error: {0}")]
    Transport(String),

    /// The server asked for a longer pause than the policy allows
    #[error("Server requested a {}s retry delay, above the {}s limit: {message}", .requested.as_secs(), .max.as_secs())]
    RetryDelayExceeded {
        requested: Duration,
        max: Duration,
        message: String,
    },

    /// Every attempt completed without content
    #[error("Model returned an empty response after {attempts} attempts")]
    EmptyResponse { attempts: u32 },

    /// The caller cancelled the request
    #[error("Request was aborted")]
    Aborted,

    /// Vendor finish/status code with no known mapping
    #[error("Unhandled stop reason from {api}: {reason}")]
    UnmappedStopReason { api: Api, reason: String },

    /// Error event delivered inside an open stream
    #[error("{0}")]
    Stream(String),

    /// Response parsing error
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ProviderError {
    pub fn missing_credentials(provider: impl Into<String>, remediation: impl Into<String>) -> Self {
        ProviderError::MissingCredentials {
            provider: provider.into(),
            remediation: remediation.into(),
        }
    }

    pub fn http(status: u16, message: impl Into<String>) -> Self {
        ProviderError::Http {
            status,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Whether the HTTP retry loop may re-issue the request
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Http {
                status, message, ..
            } => is_retryable_status(*status) || is_retryable_text(message),
            ProviderError::Transport(_) => true,
            ProviderError::Stream(message) => is_retryable_text(message),
            ProviderError::MissingCredentials { .. }
            | ProviderError::InvalidCredentials { .. }
            | ProviderError::RetryDelayExceeded { .. }
            | ProviderError::EmptyResponse { .. }
            | ProviderError::Aborted
            | ProviderError::UnmappedStopReason { .. }
            | ProviderError::Parse(_)
            | ProviderError::Configuration(_) => false,
        }
    }

    /// Delay suggested by the vendor, already padded
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::Http { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, ProviderError::Aborted)
    }
}

/// Rewrite a transport failure so its message names the root cause
///
/// reqwest's top-level message is usually "error sending request"; the
/// useful part (connection refused, DNS failure, reset) sits at the bottom
/// of the source chain.
pub fn transport_error(err: &reqwest::Error) -> ProviderError {
    let mut cause: &dyn StdError = err;
    while let Some(source) = cause.source() {
        cause = source;
    }
    let root = cause.to_string();
    let top = err.to_string();
    if root == top {
        ProviderError::Transport(top)
    } else if err.is_timeout() {
        ProviderError::Transport(format!("request timed out ({root})"))
    } else {
        ProviderError::Transport(format!("{top}: {root}"))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            ProviderError::http(status.as_u16(), err.to_string())
        } else if err.is_decode() {
            ProviderError::Parse(err.to_string())
        } else {
            transport_error(&err)
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ProviderError::http(429, "Too Many Requests").is_retryable());
        assert!(ProviderError::http(503, "unavailable").is_retryable());
        assert!(ProviderError::http(400, "RESOURCE_EXHAUSTED: quota").is_retryable());
        assert!(!ProviderError::http(400, "invalid model").is_retryable());
        assert!(ProviderError::Transport("connection reset".into()).is_retryable());
        assert!(!ProviderError::Aborted.is_retryable());
        assert!(!ProviderError::UnmappedStopReason {
            api: Api::OpenAiCompletions,
            reason: "weird".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_missing_credentials_message_names_provider() {
        let err = ProviderError::missing_credentials("openai", "Set OPENAI_API_KEY.");
        assert_eq!(
            err.to_string(),
            "No API key found for provider \"openai\". Set OPENAI_API_KEY."
        );
    }
}
