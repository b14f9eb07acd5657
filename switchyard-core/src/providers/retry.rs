//! Retry policy and delay extraction for resilient provider operations
//!
//! This module implements the two bounded retry loops shared by every
//! adapter: the HTTP-error loop (status/text classification, vendor
//! suggested delays, exponential backoff) and the parameters of the
//! empty-stream loop run by the stream driver.

use crate::providers::error::{ProviderError, ProviderResult};
use chrono::{DateTime, Utc};
use rand::Rng;
use regex::Regex;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::LazyLock;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Statuses the HTTP loop retries
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

static RETRYABLE_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)resource.?exhausted|rate.?limit|overloaded|service.?unavailable|other.?side.?closed")
        .expect("static regex")
});

static RESET_AFTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)reset after (?:(\d+)h)?(?:(\d+)m)?(?:(\d+(?:\.\d+)?)s)?").expect("static regex")
});

static RETRY_IN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)please retry in (\d+(?:\.\d+)?)\s*(ms|s)\b").expect("static regex")
});

static RETRY_DELAY_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""retryDelay"\s*:\s*"(\d+(?:\.\d+)?)(ms|s)""#).expect("static regex")
});

/// Padding added to every server-suggested delay
pub const DEFAULT_SERVER_DELAY_MARGIN: Duration = Duration::from_secs(1);

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts after the first request
    pub max_retries: u32,

    /// Backoff base in milliseconds, doubled per attempt
    pub base_delay_ms: u64,

    /// Re-issues allowed when a stream completes with no content
    pub max_empty_stream_retries: u32,

    /// Empty-stream backoff base in milliseconds
    pub empty_stream_base_delay_ms: u64,

    /// Padding added to server-suggested delays (milliseconds)
    pub server_delay_margin_ms: u64,

    /// Server-suggested delays above this fail immediately (milliseconds)
    pub max_retry_delay_ms: u64,

    /// Jitter factor (0.0 to 1.0) applied to computed backoff only
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_empty_stream_retries: 2,
            empty_stream_base_delay_ms: 500,
            server_delay_margin_ms: DEFAULT_SERVER_DELAY_MARGIN.as_millis() as u64,
            max_retry_delay_ms: 60_000,
            jitter_factor: 0.0,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with a custom retry count
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Create a policy with no retries of either kind
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            max_empty_stream_retries: 0,
            ..Default::default()
        }
    }

    pub fn server_delay_margin(&self) -> Duration {
        Duration::from_millis(self.server_delay_margin_ms)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }

    /// Exponential backoff for the given zero-based retry attempt
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay_ms as f64 * 2f64.powi(attempt as i32);
        let delayed = if self.jitter_factor > 0.0 {
            let range = base * self.jitter_factor.min(1.0);
            let jitter = rand::thread_rng().gen_range(-range..=range);
            (base + jitter).max(0.0)
        } else {
            base
        };
        Duration::from_millis(delayed as u64)
    }

    /// Backoff before the given zero-based empty-stream retry
    pub fn empty_stream_delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.empty_stream_base_delay_ms.saturating_mul(1 << attempt.min(16)))
    }

    /// Delay to wait before retrying `error`, or the error to fail with
    pub fn delay_for(&self, attempt: u32, error: &ProviderError) -> ProviderResult<Duration> {
        match error.retry_after() {
            Some(requested) if requested > self.max_retry_delay() => {
                Err(ProviderError::RetryDelayExceeded {
                    requested,
                    max: self.max_retry_delay(),
                    message: error.to_string(),
                })
            }
            Some(requested) => Ok(requested),
            None => Ok(self.backoff_delay(attempt)),
        }
    }

    /// Check if we should retry based on the error and attempt count
    pub fn should_retry(&self, error: &ProviderError, attempt: u32) -> bool {
        attempt < self.max_retries && error.is_retryable()
    }
}

/// Whether an HTTP status is in the retryable set
pub fn is_retryable_status(status: u16) -> bool {
    RETRYABLE_STATUSES.contains(&status)
}

/// Whether an error text names a transient vendor condition
pub fn is_retryable_text(text: &str) -> bool {
    RETRYABLE_TEXT.is_match(text)
}

/// Vendor-suggested delay, padded by one second
pub fn extract_retry_delay(body: &str, headers: &HeaderMap) -> Option<Duration> {
    extract_retry_delay_with_margin(body, headers, DEFAULT_SERVER_DELAY_MARGIN)
}

/// Vendor-suggested delay from headers, then body, padded by `margin`
///
/// Order: `Retry-After` (seconds or HTTP-date), `x-ratelimit-reset` (epoch
/// seconds), `x-ratelimit-reset-after` (seconds), then the body patterns.
pub fn extract_retry_delay_with_margin(
    body: &str,
    headers: &HeaderMap,
    margin: Duration,
) -> Option<Duration> {
    delay_from_headers(headers, Utc::now())
        .or_else(|| delay_from_body(body))
        .map(|delay| delay.saturating_add(margin))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Non-negative seconds as a delay; values past `Duration::MAX` saturate
fn seconds(value: f64) -> Option<Duration> {
    if !(value.is_finite() && value >= 0.0) {
        return None;
    }
    Some(Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX))
}

fn until(target: DateTime<Utc>, now: DateTime<Utc>) -> Option<Duration> {
    (target - now).to_std().ok()
}

fn delay_from_headers(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    if let Some(value) = header_str(headers, "retry-after") {
        if let Ok(secs) = value.parse::<f64>() {
            if let Some(delay) = seconds(secs) {
                return Some(delay);
            }
        } else if let Ok(date) = DateTime::parse_from_rfc2822(value) {
            if let Some(delay) = until(date.with_timezone(&Utc), now) {
                return Some(delay);
            }
        }
    }

    if let Some(reset) = header_str(headers, "x-ratelimit-reset").and_then(|v| v.parse::<i64>().ok()) {
        if let Some(delay) = DateTime::from_timestamp(reset, 0).and_then(|at| until(at, now)) {
            return Some(delay);
        }
    }

    header_str(headers, "x-ratelimit-reset-after")
        .and_then(|v| v.parse::<f64>().ok())
        .and_then(seconds)
}

fn unit_delay(amount: &str, unit: &str) -> Option<Duration> {
    let amount: f64 = amount.parse().ok()?;
    match unit {
        "ms" => seconds(amount / 1000.0),
        _ => seconds(amount),
    }
}

fn delay_from_body(body: &str) -> Option<Duration> {
    if let Some(caps) = RESET_AFTER.captures(body) {
        let part = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<f64>().ok());
        let (hours, minutes, secs) = (part(1), part(2), part(3));
        if hours.is_some() || minutes.is_some() || secs.is_some() {
            let total = hours.unwrap_or(0.0) * 3600.0 + minutes.unwrap_or(0.0) * 60.0 + secs.unwrap_or(0.0);
            return seconds(total);
        }
    }

    if let Some(caps) = RETRY_IN.captures(body) {
        return unit_delay(&caps[1], &caps[2].to_ascii_lowercase());
    }

    RETRY_DELAY_FIELD
        .captures(body)
        .and_then(|caps| unit_delay(&caps[1], &caps[2]))
}

/// Sleep for `delay` unless `signal` fires first
pub async fn sleep_abortable(delay: Duration, signal: &CancellationToken) -> ProviderResult<()> {
    tokio::select! {
        _ = signal.cancelled() => Err(ProviderError::Aborted),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

/// Result of a retried operation
#[derive(Debug)]
pub struct RetryOutcome<T> {
    /// The successful value
    pub value: T,

    /// Number of requests issued, including the successful one
    pub attempts: u32,

    /// Every delay slept between attempts
    pub delays: Vec<Duration>,
}

/// Executor for the HTTP-error retry loop
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    /// Create a new retry executor with the given policy
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute an operation with retry logic
    ///
    /// Each attempt and each sleep races against `signal`; cancellation
    /// surfaces as [`ProviderError::Aborted`].
    pub async fn execute<F, T, Fut>(
        &self,
        signal: &CancellationToken,
        mut operation: F,
    ) -> ProviderResult<RetryOutcome<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        let mut attempt = 0;
        let mut delays = Vec::new();

        loop {
            if signal.is_cancelled() {
                return Err(ProviderError::Aborted);
            }

            let result = tokio::select! {
                _ = signal.cancelled() => Err(ProviderError::Aborted),
                result = operation() => result,
            };

            match result {
                Ok(value) => {
                    return Ok(RetryOutcome {
                        value,
                        attempts: attempt + 1,
                        delays,
                    });
                }
                Err(error) => {
                    if !self.policy.should_retry(&error, attempt) {
                        if attempt > 0 {
                            debug!(attempts = attempt + 1, %error, "giving up after retries");
                        }
                        return Err(error);
                    }

                    let delay = self.policy.delay_for(attempt, &error)?;
                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        %error,
                        "retrying request"
                    );
                    sleep_abortable(delay, signal).await?;
                    delays.push(delay);
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use std::sync::atomic::{AtomicU32, Ordering};
    use test_case::test_case;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_retry_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.base_delay_ms, 1_000);
        assert_eq!(policy.max_empty_stream_retries, 2);
        assert_eq!(policy.empty_stream_base_delay_ms, 500);
    }

    #[test]
    fn test_exponential_backoff_calculation() {
        let policy = RetryPolicy {
            base_delay_ms: 100,
            ..Default::default()
        };
        assert_eq!(policy.backoff_delay(0).as_millis(), 100);
        assert_eq!(policy.backoff_delay(1).as_millis(), 200);
        assert_eq!(policy.backoff_delay(2).as_millis(), 400);
        assert_eq!(policy.empty_stream_delay(0).as_millis(), 500);
        assert_eq!(policy.empty_stream_delay(1).as_millis(), 1000);
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = RetryPolicy {
            base_delay_ms: 1000,
            jitter_factor: 0.2,
            ..Default::default()
        };
        for _ in 0..50 {
            let delay = policy.backoff_delay(0).as_millis();
            assert!((800..=1200).contains(&delay), "delay {delay} out of range");
        }
    }

    #[test_case(429, true)]
    #[test_case(500, true)]
    #[test_case(502, true)]
    #[test_case(503, true)]
    #[test_case(504, true)]
    #[test_case(400, false)]
    #[test_case(401, false)]
    #[test_case(404, false)]
    fn test_retryable_statuses(status: u16, expected: bool) {
        assert_eq!(is_retryable_status(status), expected);
    }

    #[test_case("RESOURCE_EXHAUSTED", true)]
    #[test_case("Rate limit reached for requests", true)]
    #[test_case("overloaded_error", true)]
    #[test_case("Service Unavailable", true)]
    #[test_case("other side closed", true)]
    #[test_case("invalid_request_error", false)]
    fn test_retryable_text(text: &str, expected: bool) {
        assert_eq!(is_retryable_text(text), expected);
    }

    #[test]
    fn test_reset_after_body() {
        let delay = extract_retry_delay("Your quota will reset after 18h31m10s", &HeaderMap::new()).unwrap();
        assert_eq!(delay.as_millis(), ((18 * 60 + 31) * 60 + 10) * 1000 + 1000);
    }

    #[test]
    fn test_retry_after_seconds_header() {
        let delay = extract_retry_delay("", &headers(&[("retry-after", "5")])).unwrap();
        assert_eq!(delay.as_millis(), 6000);
    }

    #[test]
    fn test_no_signal() {
        assert!(extract_retry_delay("bad request", &HeaderMap::new()).is_none());
    }

    #[test]
    fn test_retry_after_http_date() {
        let at = Utc::now() + chrono::Duration::seconds(30);
        let value = at.to_rfc2822();
        let delay = extract_retry_delay("", &headers(&[("retry-after", &value)])).unwrap();
        assert!(delay > Duration::from_secs(29) && delay <= Duration::from_secs(31));
    }

    #[test]
    fn test_ratelimit_reset_headers() {
        let reset = (Utc::now() + chrono::Duration::seconds(10)).timestamp().to_string();
        let delay = extract_retry_delay("", &headers(&[("x-ratelimit-reset", &reset)])).unwrap();
        assert!(delay > Duration::from_secs(9) && delay <= Duration::from_secs(11));

        let delay = extract_retry_delay("", &headers(&[("x-ratelimit-reset-after", "2.5")])).unwrap();
        assert_eq!(delay.as_millis(), 3500);
    }

    #[test_case("Please retry in 250ms.", 1250)]
    #[test_case("Please retry in 3.5s.", 4500)]
    #[test_case(r#"{"details":[{"retryDelay":"7s"}]}"#, 8000)]
    #[test_case(r#"{"retryDelay": "1500ms"}"#, 2500)]
    fn test_body_patterns(body: &str, expected_ms: u128) {
        assert_eq!(extract_retry_delay(body, &HeaderMap::new()).unwrap().as_millis(), expected_ms);
    }

    #[test_case(&[("retry-after", "1e20")], ""; "huge retry-after")]
    #[test_case(&[("x-ratelimit-reset-after", "1e300")], ""; "huge reset-after")]
    #[test_case(&[], "quota will reset after 99999999999999999999h"; "huge reset body")]
    #[test_case(&[], r#"{"retryDelay": "100000000000000000000000000s"}"#; "huge retry delay field")]
    fn test_oversized_delay_saturates(pairs: &[(&'static str, &str)], body: &str) {
        let delay = extract_retry_delay(body, &headers(pairs)).unwrap();
        assert_eq!(delay, Duration::MAX);

        let error = ProviderError::Http {
            status: 429,
            message: "slow down".into(),
            retry_after: Some(delay),
        };
        assert!(matches!(
            RetryPolicy::default().delay_for(0, &error),
            Err(ProviderError::RetryDelayExceeded { .. })
        ));
    }

    #[test]
    fn test_header_wins_over_body() {
        let delay = extract_retry_delay("Please retry in 30s", &headers(&[("retry-after", "1")])).unwrap();
        assert_eq!(delay.as_millis(), 2000);
    }

    #[test]
    fn test_delay_beyond_limit_fails_fast() {
        let policy = RetryPolicy::default();
        let error = ProviderError::Http {
            status: 429,
            message: "quota".into(),
            retry_after: Some(Duration::from_secs(3600)),
        };
        assert!(matches!(
            policy.delay_for(0, &error),
            Err(ProviderError::RetryDelayExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn test_executor_retries_until_success() {
        let executor = RetryExecutor::new(RetryPolicy {
            base_delay_ms: 1,
            ..Default::default()
        });
        let calls = AtomicU32::new(0);
        let outcome = executor
            .execute(&CancellationToken::new(), || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ProviderError::http(503, "busy"))
                } else {
                    Ok("ok")
                }
            })
            .await
            .unwrap();
        assert_eq!(outcome.value, "ok");
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.delays, vec![Duration::from_millis(1), Duration::from_millis(2)]);
    }

    #[tokio::test]
    async fn test_executor_stops_on_non_retryable() {
        let executor = RetryExecutor::new(RetryPolicy::default());
        let calls = AtomicU32::new(0);
        let result: ProviderResult<RetryOutcome<()>> = executor
            .execute(&CancellationToken::new(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::http(400, "bad"))
            })
            .await;
        assert!(matches!(result, Err(ProviderError::Http { status: 400, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_executor_sleep_is_abortable() {
        let executor = RetryExecutor::new(RetryPolicy {
            base_delay_ms: 60_000,
            ..Default::default()
        });
        let signal = CancellationToken::new();
        let trigger = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let result: ProviderResult<RetryOutcome<()>> = executor
            .execute(&signal, || async { Err(ProviderError::http(500, "boom")) })
            .await;
        assert!(matches!(result, Err(ProviderError::Aborted)));
    }
}
