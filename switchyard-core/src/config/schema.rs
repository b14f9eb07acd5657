//! Configuration schema structures with serde support

use super::error::{ValidationError, ValidationErrorKind};
use super::secrets::SecretString;
use crate::protocol::CacheRetention;
use crate::providers::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Supported schema version
pub const CONFIG_VERSION: &str = "0.1";

/// Upper bound accepted for `retry.max_retries`
const MAX_RETRIES_LIMIT: u32 = 10;

/// Root configuration structure for Switchyard
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SwitchyardConfig {
    /// Schema version (required - no default)
    pub version: String,

    /// Per-provider credentials and endpoint overrides
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,

    /// Retry policy used by every call unless overridden per request
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Global defaults
    #[serde(default)]
    pub defaults: DefaultConfig,

    /// Custom metadata
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Default for SwitchyardConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION.to_string(),
            providers: Vec::new(),
            retry: RetryPolicy::default(),
            defaults: DefaultConfig::default(),
            metadata: HashMap::new(),
        }
    }
}

/// Settings for one provider name (e.g. `openai`, `openrouter`)
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Provider name as it appears in `Model::provider`
    pub name: String,

    /// API key (supports environment variable interpolation)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<SecretString>,

    /// Replaces the model's base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Extra request headers
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,

    /// Whether this provider's settings apply
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            api_key: None,
            base_url: None,
            headers: HashMap::new(),
            enabled: true,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<SecretString>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Validate provider configuration
    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        if self.name.is_empty() {
            return Err(ValidationError::required(format!("{}.name", path)));
        }

        if let Some(key) = &self.api_key {
            if key.is_empty() {
                return Err(ValidationError::required(format!("{}.api_key", path))
                    .with_context("Omit api_key to fall back to environment variables"));
            }
        }

        if let Some(base_url) = &self.base_url {
            match url::Url::parse(base_url) {
                Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
                Ok(url) => {
                    return Err(ValidationError::new(
                        format!("{}.base_url", path),
                        ValidationErrorKind::InvalidUrl {
                            message: format!("URL scheme must be http or https, got: {}", url.scheme()),
                        },
                    ));
                }
                Err(e) => {
                    return Err(ValidationError::new(
                        format!("{}.base_url", path),
                        ValidationErrorKind::InvalidUrl {
                            message: e.to_string(),
                        },
                    ));
                }
            }
        }

        Ok(())
    }
}

/// Global defaults
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DefaultConfig {
    /// Cache retention used when a request does not set one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_retention: Option<CacheRetention>,

    /// Default request temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

fn default_true() -> bool {
    true
}

impl SwitchyardConfig {
    /// Enabled settings for a provider name
    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.enabled && p.name == name)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.version.is_empty() {
            return Err(ValidationError::required("version"));
        }

        if self.version != CONFIG_VERSION {
            return Err(ValidationError::new(
                "version",
                ValidationErrorKind::InvalidVersion {
                    expected: CONFIG_VERSION.to_string(),
                    actual: self.version.clone(),
                },
            ));
        }

        let mut seen_names = HashSet::new();
        for (i, provider) in self.providers.iter().enumerate() {
            if !seen_names.insert(&provider.name) {
                return Err(ValidationError::new(
                    format!("providers[{}].name", i),
                    ValidationErrorKind::DuplicateValue {
                        value: provider.name.clone(),
                    },
                ));
            }
            provider.validate(&format!("providers[{}]", i))?;
        }

        self.validate_retry()?;

        if let Some(temperature) = self.defaults.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(ValidationError::out_of_range(
                    "defaults.temperature",
                    format!("Temperature must be between 0.0 and 2.0, got {}", temperature),
                ));
            }
        }

        Ok(())
    }

    fn validate_retry(&self) -> Result<(), ValidationError> {
        let retry = &self.retry;
        if retry.max_retries > MAX_RETRIES_LIMIT {
            return Err(ValidationError::out_of_range(
                "retry.max_retries",
                format!("At most {} retries are allowed, got {}", MAX_RETRIES_LIMIT, retry.max_retries),
            ));
        }
        if retry.max_empty_stream_retries > MAX_RETRIES_LIMIT {
            return Err(ValidationError::out_of_range(
                "retry.max_empty_stream_retries",
                format!(
                    "At most {} retries are allowed, got {}",
                    MAX_RETRIES_LIMIT, retry.max_empty_stream_retries
                ),
            ));
        }
        if !(0.0..=1.0).contains(&retry.jitter_factor) {
            return Err(ValidationError::out_of_range(
                "retry.jitter_factor",
                "Jitter factor must be between 0.0 and 1.0",
            ));
        }
        if retry.max_retry_delay_ms == 0 {
            return Err(ValidationError::out_of_range(
                "retry.max_retry_delay_ms",
                "Maximum retry delay must be positive",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(SwitchyardConfig::default().validate().is_ok());
    }

    #[test]
    fn test_duplicate_provider_names() {
        let config = SwitchyardConfig {
            providers: vec![ProviderConfig::new("openai"), ProviderConfig::new("openai")],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.field_path, "providers[1].name");
        assert!(matches!(err.kind, ValidationErrorKind::DuplicateValue { .. }));
    }

    #[test]
    fn test_invalid_base_url_scheme() {
        let config = SwitchyardConfig {
            providers: vec![ProviderConfig::new("openai").with_base_url("ftp://example.com")],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.field_path, "providers[0].base_url");
    }

    #[test]
    fn test_retry_bounds() {
        let mut config = SwitchyardConfig::default();
        config.retry.jitter_factor = 1.5;
        assert_eq!(config.validate().unwrap_err().field_path, "retry.jitter_factor");
    }

    #[test]
    fn test_disabled_provider_is_ignored() {
        let mut provider = ProviderConfig::new("openai").with_api_key("sk-test");
        provider.enabled = false;
        let config = SwitchyardConfig {
            providers: vec![provider],
            ..Default::default()
        };
        assert!(config.provider("openai").is_none());
    }
}
