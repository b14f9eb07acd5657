//! Credential wrapper and log redaction
//!
//! API keys and tokens travel as [`SecretString`], which never prints its
//! value through `Debug` or `Display`. Outgoing headers pass through
//! [`redact_headers`] before they reach the logs.

use serde::{Deserialize, Serialize};
use std::fmt;

const REDACTED: &str = "[REDACTED]";

/// Header and field name fragments that mark a credential
const SENSITIVE_FRAGMENTS: [&str; 6] = ["api-key", "api_key", "authorization", "token", "secret", "cookie"];

/// An API key, OAuth token or access token
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw value, for building auth headers only
    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Short hint of the key for diagnostics: `sk-...abcd`
    pub fn partial_redact(&self) -> String {
        let value = &self.0;
        if value.is_empty() {
            return "[EMPTY]".to_string();
        }
        if value.len() <= 8 || !value.is_ascii() {
            return REDACTED.to_string();
        }
        let head = if value.starts_with("sk-") { 3 } else { 2 };
        let tail = if value.starts_with("sk-") { 4 } else { 2 };
        format!("{}...{}", &value[..head], &value[value.len() - tail..])
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

pub fn is_sensitive_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    SENSITIVE_FRAGMENTS.iter().any(|fragment| lower.contains(fragment))
}

/// `value`, or the redaction marker when `field_name` names a credential
pub fn redact_by_field_name(field_name: &str, value: &str) -> String {
    if is_sensitive_name(field_name) {
        REDACTED.to_string()
    } else {
        value.to_string()
    }
}

/// Copy of `headers` safe to log
pub fn redact_headers<'a, I>(headers: I) -> Vec<(&'a str, String)>
where
    I: IntoIterator<Item = &'a (String, String)>,
{
    headers
        .into_iter()
        .map(|(name, value)| (name.as_str(), redact_by_field_name(name, value)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_never_formats_value() {
        let secret = SecretString::new("sk-1234567890abcdef");
        assert_eq!(secret.to_string(), "[REDACTED]");
        assert_eq!(format!("{secret:?}"), "[REDACTED]");
        assert_eq!(secret.partial_redact(), "sk-...cdef");
        assert_eq!(secret.expose_secret(), "sk-1234567890abcdef");
    }

    #[test]
    fn test_partial_redact_short_and_other_prefixes() {
        assert_eq!(SecretString::new("").partial_redact(), "[EMPTY]");
        assert_eq!(SecretString::new("abc").partial_redact(), "[REDACTED]");
        assert_eq!(SecretString::new("AIzaSyExample99").partial_redact(), "AI...99");
    }

    #[test]
    fn test_redact_vendor_headers() {
        let headers = vec![
            ("x-api-key".to_string(), "sk-ant-123".to_string()),
            ("x-goog-api-key".to_string(), "AIza".to_string()),
            ("Authorization".to_string(), "Bearer x".to_string()),
            ("anthropic-version".to_string(), "2023-06-01".to_string()),
        ];
        let redacted = redact_headers(&headers);
        assert_eq!(redacted[0].1, "[REDACTED]");
        assert_eq!(redacted[1].1, "[REDACTED]");
        assert_eq!(redacted[2].1, "[REDACTED]");
        assert_eq!(redacted[3], ("anthropic-version", "2023-06-01".to_string()));
    }
}
