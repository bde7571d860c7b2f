//! Retry logic with exponential backoff for external API calls.
//!
//! Every call the engine makes to the tunnel API and the DNS API goes through
//! [`RetryPolicy::call`]. Transient failures (timeouts, HTTP 429, 5xx) are
//! retried with exponential backoff and jitter; anything else fails
//! immediately so the caller can record it against the one item it concerns.
//!
//! The policy holds no mutable state. Each call builds its own
//! [`ExponentialBackoff`], so one policy can be shared by any number of
//! concurrent operations.

use crate::config::RetryConfig;
use crate::error::{Error, Result};
use rand::Rng;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Backoff multiplier (exponential growth factor)
const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Simple exponential backoff implementation.
///
/// Provides exponential backoff with randomization (jitter) to prevent thundering herd.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Current interval duration
    pub current_interval: Duration,
    /// Maximum interval duration
    pub max_interval: Duration,
    /// Backoff multiplier (typically 2.0 for doubling)
    pub multiplier: f64,
    /// Randomization factor (e.g., 0.1 for ±10%)
    pub randomization_factor: f64,
}

impl ExponentialBackoff {
    pub fn new(initial_interval: Duration, max_interval: Duration, randomization_factor: f64) -> Self {
        Self {
            current_interval: initial_interval,
            max_interval,
            multiplier: BACKOFF_MULTIPLIER,
            randomization_factor,
        }
    }

    /// Get the next backoff interval and grow the current one
    pub fn next_backoff(&mut self) -> Duration {
        let interval = self.current_interval;
        let jittered = self.apply_jitter(interval);

        let next = interval.as_secs_f64() * self.multiplier;
        self.current_interval = Duration::from_secs_f64(next).min(self.max_interval);

        jittered
    }

    /// Apply randomization (jitter) to an interval.
    fn apply_jitter(&self, interval: Duration) -> Duration {
        if self.randomization_factor <= 0.0 || interval.is_zero() {
            return interval;
        }

        let secs = interval.as_secs_f64();
        let delta = secs * self.randomization_factor;

        let jittered = rand::thread_rng().gen_range((secs - delta)..=(secs + delta));
        Duration::from_secs_f64(jittered.max(0.0))
    }
}

/// Retry policy shared by every external call of a cycle
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub jitter_factor: f64,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration, max_attempts: u32, jitter_factor: f64) -> Self {
        Self {
            base_delay,
            max_delay,
            max_attempts: max_attempts.max(1),
            jitter_factor,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            config.max_attempts,
            config.jitter_factor,
        )
    }

    /// Fresh backoff schedule for one operation
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(self.base_delay, self.max_delay, self.jitter_factor)
    }

    /// Run `operation` until it succeeds, fails permanently or runs out of attempts
    ///
    /// # Errors
    ///
    /// - The operation's own error when it is not transient (one attempt only)
    /// - [`Error::RetryExhausted`] wrapping the last error after `max_attempts`
    ///   transient failures
    pub async fn call<T, F, Fut>(&self, operation_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut backoff = self.backoff();
        let start_time = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(
                            operation = operation_name,
                            attempt = attempt,
                            elapsed = ?start_time.elapsed(),
                            "External call succeeded after retries"
                        );
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_transient() => {
                    error!(
                        operation = operation_name,
                        error = %e,
                        "Non-retryable error, failing immediately"
                    );
                    return Err(e);
                }
                Err(e) if attempt >= self.max_attempts => {
                    error!(
                        operation = operation_name,
                        attempt = attempt,
                        elapsed = ?start_time.elapsed(),
                        error = %e,
                        "Retries exhausted, giving up"
                    );
                    return Err(Error::RetryExhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                Err(e) => {
                    let delay = backoff.next_backoff();
                    warn!(
                        operation = operation_name,
                        attempt = attempt,
                        retry_after = ?delay,
                        error = %e,
                        "Transient error, will retry"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
