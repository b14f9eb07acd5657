//! Environment variable interpolation for configuration

use super::error::ConfigError;
use super::schema::SwitchyardConfig;
use super::secrets::SecretString;
use regex::{Captures, Regex};
use std::env;
use std::sync::LazyLock;

static ENV_VAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("static regex"));

/// Whether a value still holds a `${VAR}` placeholder
pub fn has_placeholder(value: &str) -> bool {
    ENV_VAR_PATTERN.is_match(value)
}

/// Interpolate environment variables in a configuration string
///
/// Fails on the first referenced variable that is not set.
pub fn interpolate_env_vars(content: &str) -> Result<String, ConfigError> {
    interpolate_with(content, |name| env::var(name).ok())
}

/// Interpolate using a custom lookup
pub fn interpolate_with(
    content: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String, ConfigError> {
    let mut missing: Option<String> = None;
    let result = ENV_VAR_PATTERN.replace_all(content, |caps: &Captures<'_>| {
        let name = &caps[1];
        match lookup(name) {
            Some(value) => value,
            None => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(var) => Err(ConfigError::EnvVarNotFound { var }),
        None => Ok(result.into_owned()),
    }
}

/// Interpolate the string fields of a loaded configuration
///
/// JSON and YAML inputs are interpolated as text before parsing; this pass
/// covers configurations built in code.
pub fn interpolate_config_env_vars(config: &mut SwitchyardConfig) -> Result<(), ConfigError> {
    for provider in &mut config.providers {
        if let Some(key) = &provider.api_key {
            if has_placeholder(key.expose_secret()) {
                provider.api_key = Some(SecretString::new(interpolate_env_vars(key.expose_secret())?));
            }
        }

        if let Some(base_url) = &provider.base_url {
            if has_placeholder(base_url) {
                provider.base_url = Some(interpolate_env_vars(base_url)?);
            }
        }

        for value in provider.headers.values_mut() {
            if has_placeholder(value) {
                *value = interpolate_env_vars(value)?;
            }
        }
    }

    Ok(())
}
