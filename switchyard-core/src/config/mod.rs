//! Configuration module for Switchyard
//!
//! Configuration supplies per-provider API keys, base-URL overrides and
//! extra headers, the default cache retention and the retry policy used by
//! the [`Switchyard`](crate::providers::Switchyard) factory. Files are YAML
//! or JSON; `${VAR}` placeholders are resolved from the environment before
//! parsing.

mod env;
mod error;
mod schema;
mod secrets;
mod validator;

pub use env::{interpolate_env_vars, interpolate_with};
pub use error::{ConfigError, ConfigResult, ValidationError, ValidationErrorKind};
pub use schema::{DefaultConfig, ProviderConfig, SwitchyardConfig, CONFIG_VERSION};
pub use secrets::{is_sensitive_name, redact_by_field_name, redact_headers, SecretString};
pub use validator::ConfigValidator;

use std::fs;
use std::path::Path;
use tracing::debug;

fn read(path: &Path) -> ConfigResult<String> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
        path: path.to_string_lossy().to_string(),
        source: e,
    })?;
    interpolate_env_vars(&content)
}

fn finish(mut config: SwitchyardConfig, path: &Path) -> ConfigResult<SwitchyardConfig> {
    env::interpolate_config_env_vars(&mut config)?;
    ConfigValidator::new().validate(&config)?;
    debug!(
        path = %path.display(),
        providers = config.providers.len(),
        "loaded configuration"
    );
    Ok(config)
}

/// Load a configuration from a YAML file
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> ConfigResult<SwitchyardConfig> {
    let path = path.as_ref();
    let content = read(path)?;
    let config: SwitchyardConfig =
        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_string_lossy().to_string(),
            line: e.location().map(|l| l.line()),
            column: e.location().map(|l| l.column()),
            message: e.to_string(),
        })?;
    finish(config, path)
}

/// Load a configuration from a JSON file
pub fn load_from_json<P: AsRef<Path>>(path: P) -> ConfigResult<SwitchyardConfig> {
    let path = path.as_ref();
    let content = read(path)?;
    let config: SwitchyardConfig =
        serde_json::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_string_lossy().to_string(),
            line: Some(e.line()),
            column: Some(e.column()),
            message: e.to_string(),
        })?;
    finish(config, path)
}

/// Load a configuration, picking the format from the file extension
pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<SwitchyardConfig> {
    let path = path.as_ref();
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => load_from_yaml(path),
        Some("json") => load_from_json(path),
        _ => Err(ConfigError::UnsupportedFormat {
            path: path.to_string_lossy().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_yaml() {
        let yaml = r#"
version: "0.1"
providers:
  - name: openai
    api_key: sk-test
  - name: openrouter
    base_url: https://openrouter.ai/api/v1
    headers:
      HTTP-Referer: https://example.com
retry:
  max_retries: 5
  base_delay_ms: 250
defaults:
  cache_retention: long
"#;
        let config: SwitchyardConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.max_empty_stream_retries, 2);
        assert_eq!(
            config.defaults.cache_retention,
            Some(crate::protocol::CacheRetention::Long)
        );
    }
}
