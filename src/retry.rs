//! Bounded retry with exponential backoff for remote calls.
//!
//! Every call to the board service and the calendar service goes through
//! [`RetryPolicy::execute`]. The operation classifies its own failures:
//!
//! - [`CallError::Retryable`] - network errors and 5xx responses
//! - [`CallError::Terminal`] - request construction failures, undecodable
//!   responses and any other non-success status
//!
//! Terminal failures abort immediately. Retryable failures are retried up to
//! `max_attempts` times, sleeping `base_delay * 2^(attempt - 1)` (capped at
//! `max_delay`) between attempts. The retry loop runs on the caller's task and
//! never runs the operation concurrently with itself.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

/// Attempts made before giving up on a retryable failure.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(8);

/// Upper bound for a single request, connect to last body byte.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Failure of a single attempt, as classified by the operation itself.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallError {
    /// Transient failure; another attempt may succeed.
    #[error("{0}")]
    Retryable(String),
    /// Permanent failure; retrying cannot help.
    #[error("{0}")]
    Terminal(String),
}

impl CallError {
    /// Classify a `reqwest` send error.
    ///
    /// Builder errors mean the request itself was malformed and are terminal.
    /// Everything else (connect, timeout, connection reset) is retryable.
    #[must_use]
    pub fn from_send(context: &str, err: &reqwest::Error) -> Self {
        if err.is_builder() {
            Self::Terminal(format!("{context}: failed to build request: {err}"))
        } else {
            Self::Retryable(format!("{context}: request failed: {err}"))
        }
    }

    /// Classify a non-success HTTP response, consuming its body for the message.
    ///
    /// 5xx statuses are retryable, every other status is terminal.
    pub async fn from_response(context: &str, response: reqwest::Response) -> Self {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = format!("{context}: remote returned {status}: {body}");

        if status.is_server_error() {
            Self::Retryable(message)
        } else {
            Self::Terminal(message)
        }
    }

    /// A response arrived but could not be decoded. Always terminal.
    #[must_use]
    pub fn decode(context: &str, err: &impl std::fmt::Display) -> Self {
        Self::Terminal(format!("{context}: failed to decode response: {err}"))
    }

    /// Whether another attempt may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }
}

/// Final outcome of a call that did not succeed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RetryError {
    /// The operation reported a terminal failure. No further attempts were made.
    #[error("{0}")]
    Terminal(String),
    /// Every attempt failed with a retryable error.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

/// Retry ceiling and backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Values below 1 are treated as 1.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Policy with the given ceiling and base delay, keeping the default cap.
    #[must_use]
    pub const fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }

    /// Policy that retries without sleeping.
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay to wait after the given (1-based) failed attempt.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(2_u32.saturating_pow(exponent))
            .min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails terminally, or the ceiling is reached.
    ///
    /// `operation` names the call in retry warnings.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::Terminal`] on the first terminal failure and
    /// [`RetryError::Exhausted`] carrying the last cause once all attempts
    /// failed with retryable errors.
    pub async fn execute<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            match op().await {
                Ok(value) => return Ok(value),
                Err(CallError::Terminal(message)) => return Err(RetryError::Terminal(message)),
                Err(CallError::Retryable(message)) => {
                    if attempt >= max_attempts {
                        return Err(RetryError::Exhausted {
                            attempts: attempt,
                            last: message,
                        });
                    }

                    let delay = self.delay_after(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %message,
                        "Remote call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// HTTP client used by the remote clients.
///
/// A request that hits [`REQUEST_TIMEOUT`] surfaces as a retryable send error.
///
/// # Errors
///
/// Returns [`crate::Error::Http`] if the TLS backend cannot be initialised.
pub fn http_client() -> crate::Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?)
}
