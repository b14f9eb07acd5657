//! Credential resolution
//!
//! Order: explicit option, configured key, environment variables (first
//! non-empty alias), then ambient cloud credentials. Ambient lookups (Google
//! application-default credentials, the AWS SDK config) are cached on the
//! resolver, which lives as long as its [`Switchyard`](super::Switchyard).

use crate::config::{SecretString, SwitchyardConfig};
use crate::http::{extract_error_message, HttpClient};
use crate::protocol::{Api, Model};
use crate::providers::error::{transport_error, ProviderError, ProviderResult};
use aws_config::meta::region::RegionProviderChain;
use aws_config::retry::RetryConfig;
use aws_config::{BehaviorVersion, SdkConfig};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

/// Google OAuth token endpoint
pub const GOOGLE_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

/// Vertex location used when none is configured
pub const DEFAULT_VERTEX_LOCATION: &str = "us-central1";

/// AWS region used when the environment names none
const DEFAULT_AWS_REGION: &str = "us-east-1";

/// Refresh Google tokens this long before they expire
const TOKEN_EXPIRY_SKEW: Duration = Duration::from_secs(60);

/// Environment lookup, replaceable in tests
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Resolved credential, one variant per vendor shape
#[derive(Clone)]
pub enum Credential {
    /// Plain API key sent as a bearer token or vendor key header
    ApiKey(SecretString),

    /// Anthropic OAuth access token
    OAuthToken(SecretString),

    /// Cloud Code Assist token and project from the `{token, projectId}` key
    GeminiCli { token: SecretString, project_id: String },

    /// Google Cloud access token from application-default credentials
    GoogleCloud {
        access_token: SecretString,
        project: String,
        location: String,
    },

    /// AWS SDK configuration with SDK retries disabled
    Aws(SdkConfig),
}

impl Credential {
    /// Secret usable as a bearer token, when the variant carries one
    pub fn bearer(&self) -> Option<&str> {
        match self {
            Credential::ApiKey(key) | Credential::OAuthToken(key) => Some(key.expose_secret()),
            Credential::GeminiCli { token, .. } => Some(token.expose_secret()),
            Credential::GoogleCloud { access_token, .. } => Some(access_token.expose_secret()),
            Credential::Aws(_) => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Credential::ApiKey(_) => "api_key",
            Credential::OAuthToken(_) => "oauth_token",
            Credential::GeminiCli { .. } => "gemini_cli",
            Credential::GoogleCloud { .. } => "google_cloud",
            Credential::Aws(_) => "aws",
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::GeminiCli { project_id, .. } => f
                .debug_struct("GeminiCli")
                .field("token", &"[REDACTED]")
                .field("project_id", project_id)
                .finish(),
            Credential::GoogleCloud { project, location, .. } => f
                .debug_struct("GoogleCloud")
                .field("access_token", &"[REDACTED]")
                .field("project", project)
                .field("location", location)
                .finish(),
            other => write!(f, "{}([REDACTED])", other.kind()),
        }
    }
}

/// Environment variables consulted for a provider, in order
pub fn env_var_names(provider: &str) -> Vec<String> {
    let fixed: &[&str] = match provider {
        "openai" => &["OPENAI_API_KEY"],
        "anthropic" => &["ANTHROPIC_OAUTH_TOKEN", "ANTHROPIC_API_KEY"],
        "google" => &["GEMINI_API_KEY"],
        "github-copilot" => &["COPILOT_GITHUB_TOKEN", "GH_TOKEN", "GITHUB_TOKEN"],
        "google-gemini-cli" | "google-antigravity" | "google-vertex" | "amazon-bedrock" => &[],
        other => return vec![format!("{}_API_KEY", other.to_uppercase().replace('-', "_"))],
    };
    fixed.iter().map(|name| name.to_string()).collect()
}

fn remediation(model: &Model) -> String {
    match model.api {
        Api::GoogleGeminiCli => "Use /login to authenticate with Google Cloud Code Assist.".to_string(),
        Api::GoogleVertex => "Run `gcloud auth application-default login` and set GOOGLE_CLOUD_PROJECT.".to_string(),
        Api::BedrockConverseStream => {
            "Configure AWS credentials via AWS_PROFILE, AWS_ACCESS_KEY_ID/AWS_SECRET_ACCESS_KEY or AWS_BEARER_TOKEN_BEDROCK."
                .to_string()
        }
        _ => match env_var_names(&model.provider).as_slice() {
            [] => "Pass an API key in the request options.".to_string(),
            names => format!("Set {} or pass an API key in the request options.", names.join(" or ")),
        },
    }
}

fn is_anthropic_oauth(key: &str) -> bool {
    key.contains("sk-ant-oat")
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCliKey {
    token: String,
    project_id: String,
}

/// Parse the Cloud Code Assist `{token, projectId}` key
pub fn parse_gemini_cli_key(provider: &str, raw: &str) -> ProviderResult<Credential> {
    let invalid = || ProviderError::InvalidCredentials {
        provider: provider.to_string(),
        message: "Invalid Google Cloud credentials. Use /login to re-authenticate.".to_string(),
    };
    let key: GeminiCliKey = serde_json::from_str(raw).map_err(|_| invalid())?;
    if key.token.is_empty() || key.project_id.is_empty() {
        return Err(invalid());
    }
    Ok(Credential::GeminiCli {
        token: SecretString::new(key.token),
        project_id: key.project_id,
    })
}

#[derive(Debug, Deserialize)]
struct AdcFile {
    #[serde(rename = "type")]
    kind: String,
    client_id: Option<String>,
    client_secret: Option<String>,
    refresh_token: Option<String>,
    quota_project_id: Option<String>,
    project_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedGoogleToken {
    access_token: SecretString,
    project: Option<String>,
    expires_at: Instant,
}

/// Resolves credentials and caches ambient lookups
pub struct CredentialResolver {
    config: Arc<SwitchyardConfig>,
    env: EnvLookup,
    http: HttpClient,
    google_token_endpoint: String,
    google_token: Mutex<Option<CachedGoogleToken>>,
    aws: OnceCell<SdkConfig>,
}

impl CredentialResolver {
    pub fn new(config: Arc<SwitchyardConfig>, http: HttpClient) -> Self {
        Self {
            config,
            env: Arc::new(|name: &str| std::env::var(name).ok()),
            http,
            google_token_endpoint: GOOGLE_TOKEN_ENDPOINT.to_string(),
            google_token: Mutex::new(None),
            aws: OnceCell::new(),
        }
    }

    /// Replace the environment lookup
    pub fn with_env(mut self, env: EnvLookup) -> Self {
        self.env = env;
        self
    }

    /// Replace the Google token endpoint
    pub fn with_google_token_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.google_token_endpoint = endpoint.into();
        self
    }

    fn env_value(&self, name: &str) -> Option<String> {
        (self.env)(name).filter(|value| !value.trim().is_empty())
    }

    /// First non-empty environment alias for `provider`
    fn env_key(&self, provider: &str) -> Option<(String, String)> {
        env_var_names(provider)
            .into_iter()
            .find_map(|name| self.env_value(&name).map(|value| (name, value)))
    }

    /// Resolve a credential for `model`
    pub async fn resolve(&self, model: &Model, explicit: Option<&str>) -> ProviderResult<Credential> {
        let provider = model.provider.as_str();

        let key = if let Some(key) = explicit.filter(|key| !key.trim().is_empty()) {
            debug!(provider, source = "explicit", "resolved credential");
            Some((key.to_string(), false))
        } else if let Some(key) = self
            .config
            .provider(provider)
            .and_then(|p| p.api_key.as_ref())
            .filter(|key| !key.is_empty())
        {
            debug!(provider, source = "config", "resolved credential");
            Some((key.expose_secret().to_string(), false))
        } else if let Some((name, value)) = self.env_key(provider) {
            debug!(provider, source = %name, "resolved credential");
            Some((value, name == "ANTHROPIC_OAUTH_TOKEN"))
        } else {
            None
        };

        match (model.api, key) {
            (Api::GoogleGeminiCli, Some((raw, _))) => parse_gemini_cli_key(provider, &raw),
            (Api::GoogleVertex, Some((key, _))) => Ok(Credential::ApiKey(SecretString::new(key))),
            (Api::GoogleVertex, None) => self.google_cloud(model).await,
            (Api::BedrockConverseStream, _) => self.aws(model).await,
            (Api::AnthropicMessages, Some((key, oauth))) if oauth || is_anthropic_oauth(&key) => {
                Ok(Credential::OAuthToken(SecretString::new(key)))
            }
            (_, Some((key, _))) => Ok(Credential::ApiKey(SecretString::new(key))),
            (_, None) => Err(ProviderError::missing_credentials(provider, remediation(model))),
        }
    }

    fn adc_path(&self) -> Option<PathBuf> {
        if let Some(path) = self.env_value("GOOGLE_APPLICATION_CREDENTIALS") {
            return Some(PathBuf::from(path));
        }
        #[cfg(windows)]
        let base = dirs::config_dir();
        #[cfg(not(windows))]
        let base = dirs::home_dir().map(|home| home.join(".config"));
        base.map(|dir| dir.join("gcloud").join("application_default_credentials.json"))
    }

    async fn google_cloud(&self, model: &Model) -> ProviderResult<Credential> {
        let missing = || ProviderError::missing_credentials(&model.provider, remediation(model));
        let location = self
            .env_value("GOOGLE_CLOUD_LOCATION")
            .unwrap_or_else(|| DEFAULT_VERTEX_LOCATION.to_string());

        // The lock only guards the slot; refreshes run unlocked and the last one wins.
        let fresh = self
            .google_token
            .lock()
            .await
            .as_ref()
            .filter(|token| token.expires_at > Instant::now() + TOKEN_EXPIRY_SKEW)
            .map(|token| (token.access_token.clone(), token.project.clone()));
        let (access_token, adc_project) = match fresh {
            Some(pair) => pair,
            None => {
                let token = self.refresh_google_token(model).await?;
                let pair = (token.access_token.clone(), token.project.clone());
                *self.google_token.lock().await = Some(token);
                pair
            }
        };

        let project = self
            .env_value("GOOGLE_CLOUD_PROJECT")
            .or_else(|| self.env_value("GCLOUD_PROJECT"))
            .or(adc_project)
            .ok_or_else(missing)?;

        Ok(Credential::GoogleCloud {
            access_token,
            project,
            location,
        })
    }

    async fn refresh_google_token(&self, model: &Model) -> ProviderResult<CachedGoogleToken> {
        let provider = model.provider.as_str();
        let path = self
            .adc_path()
            .filter(|path| path.is_file())
            .ok_or_else(|| ProviderError::missing_credentials(provider, remediation(model)))?;

        let raw = tokio::fs::read_to_string(&path).await.map_err(|e| ProviderError::InvalidCredentials {
            provider: provider.to_string(),
            message: format!("Failed to read {}: {}", path.display(), e),
        })?;
        let adc: AdcFile = serde_json::from_str(&raw).map_err(|e| ProviderError::InvalidCredentials {
            provider: provider.to_string(),
            message: format!("Malformed application-default credentials at {}: {}", path.display(), e),
        })?;

        let (Some(client_id), Some(client_secret), Some(refresh_token)) =
            (&adc.client_id, &adc.client_secret, &adc.refresh_token)
        else {
            return Err(ProviderError::InvalidCredentials {
                provider: provider.to_string(),
                message: format!(
                    "Unsupported application-default credential type \"{}\". Run `gcloud auth application-default login`.",
                    adc.kind
                ),
            });
        };

        let response = self
            .http
            .inner()
            .post(&self.google_token_endpoint)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("refresh_token", refresh_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| transport_error(&e))?;
        if !status.is_success() {
            return Err(ProviderError::InvalidCredentials {
                provider: provider.to_string(),
                message: format!(
                    "Google token refresh failed ({}): {}. Run `gcloud auth application-default login`.",
                    status.as_u16(),
                    extract_error_message(&body).unwrap_or_default()
                ),
            });
        }
        let token: TokenResponse = serde_json::from_str(&body)?;
        info!(provider, "refreshed Google access token");

        Ok(CachedGoogleToken {
            access_token: SecretString::new(token.access_token),
            project: adc.quota_project_id.or(adc.project_id),
            expires_at: Instant::now() + Duration::from_secs(token.expires_in.unwrap_or(3600)),
        })
    }

    fn has_aws_credentials(&self) -> bool {
        let has = |name: &str| self.env_value(name).is_some();
        has("AWS_PROFILE")
            || (has("AWS_ACCESS_KEY_ID") && has("AWS_SECRET_ACCESS_KEY"))
            || has("AWS_BEARER_TOKEN_BEDROCK")
            || has("AWS_CONTAINER_CREDENTIALS_RELATIVE_URI")
            || has("AWS_CONTAINER_CREDENTIALS_FULL_URI")
            || has("AWS_WEB_IDENTITY_TOKEN_FILE")
            || dirs::home_dir().is_some_and(|home| home.join(".aws").join("credentials").is_file())
    }

    async fn aws(&self, model: &Model) -> ProviderResult<Credential> {
        if let Some(config) = self.aws.get() {
            return Ok(Credential::Aws(config.clone()));
        }
        if !self.has_aws_credentials() {
            return Err(ProviderError::missing_credentials(&model.provider, remediation(model)));
        }
        let config = self
            .aws
            .get_or_init(|| async {
                let region = RegionProviderChain::default_provider().or_else(DEFAULT_AWS_REGION);
                // The shared retry executor owns retries.
                let config = aws_config::defaults(BehaviorVersion::latest())
                    .region(region)
                    .retry_config(RetryConfig::disabled())
                    .load()
                    .await;
                debug!(region = ?config.region(), "loaded AWS configuration");
                config
            })
            .await;
        Ok(Credential::Aws(config.clone()))
    }
}

impl std::fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialResolver")
            .field("google_token_endpoint", &self.google_token_endpoint)
            .finish_non_exhaustive()
    }
}
