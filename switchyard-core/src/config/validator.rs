//! Configuration validation beyond the schema checks

use super::env::has_placeholder;
use super::error::{ValidationError, ValidationErrorKind};
use super::schema::SwitchyardConfig;
use reqwest::header::{HeaderName, HeaderValue};

/// Configuration validator with additional validation rules
#[derive(Debug, Default)]
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate a configuration with extended rules
    pub fn validate(&self, config: &SwitchyardConfig) -> Result<(), ValidationError> {
        config.validate()?;
        self.validate_placeholders(config)?;
        self.validate_headers(config)?;
        Ok(())
    }

    /// Placeholders must be resolved by the time the config is used
    fn validate_placeholders(&self, config: &SwitchyardConfig) -> Result<(), ValidationError> {
        for (i, provider) in config.providers.iter().enumerate() {
            if let Some(key) = &provider.api_key {
                if has_placeholder(key.expose_secret()) {
                    return Err(ValidationError::new(
                        format!("providers[{i}].api_key"),
                        ValidationErrorKind::UnresolvedPlaceholder {
                            value: "api_key".to_string(),
                        },
                    ));
                }
            }
            if let Some(base_url) = &provider.base_url {
                if has_placeholder(base_url) {
                    return Err(ValidationError::new(
                        format!("providers[{i}].base_url"),
                        ValidationErrorKind::UnresolvedPlaceholder {
                            value: base_url.clone(),
                        },
                    ));
                }
            }
        }
        Ok(())
    }

    /// Header names and values must be sendable
    fn validate_headers(&self, config: &SwitchyardConfig) -> Result<(), ValidationError> {
        for (i, provider) in config.providers.iter().enumerate() {
            for (name, value) in &provider.headers {
                let path = format!("providers[{i}].headers.{name}");
                if let Err(e) = HeaderName::from_bytes(name.as_bytes()) {
                    return Err(ValidationError::new(
                        path,
                        ValidationErrorKind::InvalidHeader {
                            name: name.clone(),
                            message: e.to_string(),
                        },
                    ));
                }
                if let Err(e) = HeaderValue::from_str(value) {
                    return Err(ValidationError::new(
                        path,
                        ValidationErrorKind::InvalidHeader {
                            name: name.clone(),
                            message: e.to_string(),
                        },
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ProviderConfig;

    #[test]
    fn test_invalid_header_name() {
        let mut provider = ProviderConfig::new("openai");
        provider.headers.insert("bad header".to_string(), "x".to_string());
        let config = SwitchyardConfig {
            providers: vec![provider],
            ..Default::default()
        };
        let err = ConfigValidator::new().validate(&config).unwrap_err();
        assert!(matches!(err.kind, ValidationErrorKind::InvalidHeader { .. }));
    }

    #[test]
    fn test_unresolved_placeholder() {
        let config = SwitchyardConfig {
            providers: vec![ProviderConfig::new("openai").with_api_key("${OPENAI_API_KEY}")],
            ..Default::default()
        };
        let err = ConfigValidator::new().validate(&config).unwrap_err();
        assert_eq!(err.field_path, "providers[0].api_key");
    }
}
