//! Exponential backoff around remote calls
//!
//! Rate limits, 5xx responses and timeouts are retried; anything else is
//! returned to the caller immediately.

use regex::Regex;
use std::future::Future;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;

/// Rate-limit or server-error status code as a standalone token
static RETRY_STATUS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:429|5\d\d)\b").expect("valid regex"));

/// Errors raised by the HTTP clients
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP 429
    #[error("rate limited (429 Too Many Requests): {0}")]
    RateLimited(String),
    /// HTTP 5xx
    #[error("server error {status}: {body}")]
    Server { status: u16, body: String },
    /// Request exceeded its deadline
    #[error("request timed out")]
    Timeout,
    /// Any other non-success status
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

impl ApiError {
    /// Classify a non-success HTTP status
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            429 => ApiError::RateLimited(body),
            500..=599 => ApiError::Server { status, body },
            _ => ApiError::Status { status, body },
        }
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self, ApiError::Status { .. })
    }
}

/// Pass a successful response through, classify anything else
pub async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::from_status(status.as_u16(), body))
}

/// Whether an error is worth retrying
///
/// Typed errors are checked first; otherwise the message is inspected for a
/// rate-limit, server-error or timeout signal.
pub fn is_retryable(err: &anyhow::Error) -> bool {
    if let Some(api) = err.downcast_ref::<ApiError>() {
        return api.is_retryable();
    }
    if let Some(req) = err.downcast_ref::<reqwest::Error>() {
        if req.is_timeout() {
            return true;
        }
        if let Some(status) = req.status() {
            return status.as_u16() == 429 || status.is_server_error();
        }
    }
    message_signals_retry(&format!("{:#}", err))
}

fn message_signals_retry(message: &str) -> bool {
    let lower = message.to_lowercase();
    ["too many requests", "timeout", "timed out"]
        .iter()
        .any(|signal| lower.contains(signal))
        || RETRY_STATUS.is_match(&lower)
}

/// Retry budget and backoff curve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Run `call`, retrying retryable failures with exponential backoff
    ///
    /// Returns the last error once the retry budget is spent.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> anyhow::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let mut attempt = 0;
        loop {
            let err = match call().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !is_retryable(&err) {
                return Err(err);
            }

            attempt += 1;
            if attempt > self.max_retries {
                tracing::error!(
                    operation,
                    max_retries = self.max_retries,
                    error = %err,
                    "Max retries exceeded"
                );
                return Err(err);
            }

            let delay = self.backoff(attempt);
            tracing::warn!(
                operation,
                attempt,
                max_retries = self.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retryable error, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
