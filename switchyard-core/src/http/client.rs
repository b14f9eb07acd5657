//! HTTP client implementation using reqwest

use crate::config::redact_headers;
use crate::http::error::map_http_error;
use crate::providers::error::{transport_error, ProviderError, ProviderResult};
use crate::providers::retry::{RetryExecutor, RetryOutcome, RetryPolicy};
use reqwest::{Client, ClientBuilder, Response};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// Default user agent
const USER_AGENT: &str = concat!("switchyard/", env!("CARGO_PKG_VERSION"));

/// One streaming POST, re-sendable on retry
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,

    /// Correlation id used in logs
    pub request_id: Uuid,
}

impl StreamRequest {
    pub fn new(url: impl Into<String>, body: Value) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            body,
            request_id: Uuid::new_v4(),
        }
    }

    /// Add a header, replacing any earlier value with the same name
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
        self
    }

    pub fn headers<'a>(mut self, headers: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        for (name, value) in headers {
            self = self.header(name.clone(), value.clone());
        }
        self
    }
}

/// Shared HTTP client with connection pooling
#[derive(Clone)]
pub struct HttpClient {
    client: Arc<Client>,
}

impl HttpClient {
    /// Create a new HTTP client with default settings
    pub fn new() -> ProviderResult<Self> {
        Self::with_config(Duration::from_secs(10), 10)
    }

    /// Create a new HTTP client with custom connection settings
    ///
    /// No overall timeout is set: streams stay open for as long as the
    /// vendor keeps producing.
    pub fn with_config(connect_timeout: Duration, max_idle_per_host: usize) -> ProviderResult<Self> {
        let client = ClientBuilder::new()
            .pool_max_idle_per_host(max_idle_per_host)
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(connect_timeout)
            .user_agent(USER_AGENT)
            .gzip(true)
            .build()
            .map_err(|e| ProviderError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client: Arc::new(client),
        })
    }

    /// Underlying reqwest client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    async fn send_once(&self, request: &StreamRequest, margin: Duration) -> ProviderResult<Response> {
        let mut builder = self.client.post(&request.url).json(&request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|e| {
            let error = transport_error(&e);
            warn!(request_id = %request.request_id, %error, "request failed before a response");
            error
        })?;

        let status = response.status();
        if status.is_success() {
            debug!(request_id = %request.request_id, %status, "stream opened");
            return Ok(response);
        }

        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        let error = map_http_error(status, &headers, &body, margin);
        warn!(request_id = %request.request_id, %status, %error, "request rejected");
        Err(error)
    }

    /// POST and return the open streaming response, retrying per `policy`
    pub async fn post_stream(
        &self,
        request: &StreamRequest,
        policy: &RetryPolicy,
        signal: &CancellationToken,
    ) -> ProviderResult<RetryOutcome<Response>> {
        debug!(
            request_id = %request.request_id,
            url = %request.url,
            headers = ?redact_headers(&request.headers),
            "sending request"
        );
        let margin = policy.server_delay_margin();
        RetryExecutor::new(policy.clone())
            .execute(signal, || self.send_once(request, margin))
            .await
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient").finish_non_exhaustive()
    }
}
