//! Retry logic with randomized exponential backoff for transient errors.

use crate::sleep::Sleeper;
use crate::types::{RetryConfig, RetryDecision};
use std::fmt::Display;
use std::time::Duration;

/// Callback trait for retry progress notifications.
pub trait RetryCallback {
    /// Called when an operation is about to be retried.
    ///
    /// # Arguments
    /// * `attempt` - Attempt that just failed (1-indexed)
    /// * `max_attempts` - Current attempt budget
    /// * `error` - The error that triggered the retry
    /// * `delay` - Time until the next attempt
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &dyn Display, delay: Duration);
}

/// No-op callback that does nothing.
pub struct NoCallback;

impl RetryCallback for NoCallback {
    fn on_retry(&self, _attempt: u32, _max_attempts: u32, _error: &dyn Display, _delay: Duration) {
    }
}

/// Callback that reports retries through the `log` facade.
pub struct LogCallback<'a> {
    /// What is being retried, e.g. the resource name
    pub label: &'a str,
}

impl RetryCallback for LogCallback<'_> {
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &dyn Display, delay: Duration) {
        log::warn!(
            "{}: attempt {}/{} failed: {}. Retrying in {:.1}s...",
            self.label,
            attempt,
            max_attempts,
            error,
            delay.as_secs_f64()
        );
    }
}

/// Execute an operation with retry logic.
///
/// `classify` decides for each failure whether it is worth another attempt.
/// Non-retryable failures and the failure of the last attempt are returned
/// unchanged. A [`RetryDecision::RateLimited`] failure extends the attempt
/// budget by one (up to `config.max_rate_limit_extensions` times) instead of
/// consuming it.
///
/// # Arguments
/// * `config` - Retry configuration
/// * `sleeper` - Blocks between attempts
/// * `classify` - Maps an error to a retry decision
/// * `callback` - Optional callback for retry notifications
/// * `operation` - The operation to execute
pub fn with_retry<T, E, F, C>(
    config: &RetryConfig,
    sleeper: &dyn Sleeper,
    classify: C,
    callback: Option<&dyn RetryCallback>,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    C: Fn(&E) -> RetryDecision,
    E: Display,
{
    let mut budget = config.max_attempts.max(1);
    let mut extensions = 0;
    let mut attempt = 0;

    loop {
        attempt += 1;
        let error = match operation() {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        match classify(&error) {
            RetryDecision::Fail => return Err(error),
            RetryDecision::RateLimited if extensions < config.max_rate_limit_extensions => {
                extensions += 1;
                budget += 1;
            }
            RetryDecision::RateLimited | RetryDecision::Retry => {}
        }

        if attempt >= budget {
            log::debug!("Giving up after {attempt} attempts: {error}");
            return Err(error);
        }

        let delay = config.delay_for_attempt(attempt, rand::random::<f64>());
        if let Some(cb) = callback {
            cb.on_retry(attempt, budget, &error, delay);
        }
        sleeper.sleep(delay);
    }
}
