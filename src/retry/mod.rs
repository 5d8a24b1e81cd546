//! Bounded retry with exponential backoff around a single driver.
//!
//! The executor classifies every failed attempt:
//!
//! - explicit error codes listed in [`RetryConfig::retryable_error_codes`] are retryable
//! - messages containing a generic network-failure phrase (timeouts, connection resets,
//!   DNS failures, closed sockets) are retryable
//! - per-attempt timeouts are retryable
//! - everything else is fatal and returned immediately, without any delay

mod sleeper;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::driver::{DeliveryRequest, Driver, SendError, SendResult};
use crate::metrics::DriverMetrics;

pub use sleeper::{Sleeper, TokioSleeper, TrackingSleeper};

/// Phrases that mark a failure as a transient network problem
const NETWORK_ERROR_PATTERNS: &[&str] = &[
    "timeout",
    "timed out",
    "etimedout",
    "connection reset",
    "econnreset",
    "dns",
    "enotfound",
    "eai_again",
    "socket hang up",
    "socket closed",
];

/// Retry policy for a driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of send attempts
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay between attempts in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Double the delay after every attempt
    #[serde(default = "default_exponential_backoff")]
    pub exponential_backoff: bool,
    /// Upper bound for exponential delays in milliseconds
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
    /// Error codes that are always retried
    #[serde(default)]
    pub retryable_error_codes: HashSet<String>,
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_exponential_backoff() -> bool {
    true
}

fn default_max_retry_delay_ms() -> u64 {
    5000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            exponential_backoff: default_exponential_backoff(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
            retryable_error_codes: HashSet::new(),
        }
    }
}

impl RetryConfig {
    /// Policy that makes a single attempt
    pub fn no_retry() -> Self {
        Self {
            max_retries: 1,
            ..Self::default()
        }
    }

    pub fn with_retryable_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.retryable_error_codes
            .extend(codes.into_iter().map(Into::into));
        self
    }

    /// Total attempts allowed; a policy always permits at least one
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Delay to wait after the given (1-based) failed attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if !self.exponential_backoff {
            return Duration::from_millis(self.retry_delay_ms);
        }

        let exponent = attempt.saturating_sub(1).min(63);
        let delay = self
            .retry_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_retry_delay_ms);
        Duration::from_millis(delay)
    }

    /// Whether a failed attempt should be retried under this policy
    pub fn is_retryable(&self, error: &SendError) -> bool {
        match error {
            SendError::Timeout { .. } => true,
            SendError::Mapping { .. } | SendError::Exhausted { .. } => false,
            SendError::Provider { code, message } => {
                if code
                    .as_deref()
                    .is_some_and(|c| self.retryable_error_codes.contains(c))
                {
                    return true;
                }
                let message = message.to_lowercase();
                NETWORK_ERROR_PATTERNS
                    .iter()
                    .any(|pattern| message.contains(pattern))
            }
        }
    }
}

/// Runs a driver under a retry policy
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    default_policy: RetryConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl RetryExecutor {
    pub fn new(default_policy: RetryConfig) -> Self {
        Self::with_sleeper(default_policy, Arc::new(TokioSleeper))
    }

    pub fn with_sleeper(default_policy: RetryConfig, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            default_policy,
            sleeper,
        }
    }

    pub fn default_policy(&self) -> &RetryConfig {
        &self.default_policy
    }

    /// Send `request` through `driver`, retrying retryable failures.
    ///
    /// `policy` overrides the executor default. Returns the first successful outcome,
    /// or the last failed outcome once attempts are exhausted or a fatal error is seen.
    pub async fn execute(
        &self,
        driver: &dyn Driver,
        request: &DeliveryRequest,
        policy: Option<&RetryConfig>,
        timeout: Option<Duration>,
    ) -> Result<SendResult, SendError> {
        let policy = policy.unwrap_or(&self.default_policy);
        let max_attempts = policy.max_attempts();
        let mut attempt = 1;

        loop {
            let outcome = attempt_once(driver, request, timeout).await;

            let retryable = match &outcome {
                Ok(result) if !result.is_failure() => None,
                Ok(result) => Some(
                    result
                        .error
                        .as_ref()
                        .is_some_and(|e| policy.is_retryable(e)),
                ),
                Err(e) => Some(policy.is_retryable(e)),
            };
            let Some(retryable) = retryable else {
                DriverMetrics::record_attempt(driver.name(), "success");
                return outcome;
            };
            DriverMetrics::record_attempt(driver.name(), "failed");

            if !retryable || attempt >= max_attempts {
                tracing::debug!(
                    driver = %driver.name(),
                    attempt = attempt,
                    retryable = retryable,
                    "Giving up on driver"
                );
                return outcome;
            }

            let delay = policy.delay_for(attempt);
            tracing::warn!(
                driver = %driver.name(),
                channel = %request.channel,
                attempt = attempt,
                max_attempts = max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Retryable send failure, backing off"
            );
            DriverMetrics::record_retry(driver.name());

            self.sleeper.sleep(delay).await;
            attempt += 1;
        }
    }
}

async fn attempt_once(
    driver: &dyn Driver,
    request: &DeliveryRequest,
    timeout: Option<Duration>,
) -> Result<SendResult, SendError> {
    match timeout {
        Some(limit) => match tokio::time::timeout(limit, driver.send(request)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(SendError::Timeout {
                timeout_ms: limit.as_millis() as u64,
            }),
        },
        None => driver.send(request).await,
    }
}
