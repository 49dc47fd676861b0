//! Configuration types for retry and polling.

use std::time::Duration;

/// How a failed operation should be treated by [`with_retry`](crate::retry::with_retry).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Transient failure: sleep and try again, consuming one attempt
    Retry,
    /// Provider throttling: try again without consuming an attempt
    RateLimited,
    /// Permanent failure: give up and return the error unchanged
    Fail,
}

/// Configuration for retry behavior.
///
/// The delay before retry `n` (1-indexed) is
/// `base_delay + random * 2^n * jitter_unit` with `random` in `[0, 1)`.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Fixed part of every delay
    pub base_delay: Duration,
    /// Scale of the randomized exponential part
    pub jitter_unit: Duration,
    /// How many rate-limited failures may extend the attempt budget
    pub max_rate_limit_extensions: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            base_delay: Duration::from_secs(5),
            jitter_unit: Duration::from_secs(1),
            max_rate_limit_extensions: 32,
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with custom settings.
    pub fn new(max_attempts: u32, base_delay: Duration, jitter_unit: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            jitter_unit,
            ..Default::default()
        }
    }

    /// Calculate the delay before retry `attempt` (1-indexed) for a random
    /// sample in `[0, 1)`.
    pub fn delay_for_attempt(&self, attempt: u32, random: f64) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX).min(30);
        let spread = self.jitter_unit.as_secs_f64() * random.max(0.0) * 2f64.powi(exponent);
        let spread = Duration::try_from_secs_f64(spread).unwrap_or(Duration::MAX);
        self.base_delay.saturating_add(spread)
    }

    /// Create a config that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Retry without waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            jitter_unit: Duration::ZERO,
            ..Default::default()
        }
    }
}

/// What [`poll_until`](crate::poll::poll_until) does when the try budget runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeoutPolicy {
    /// Return a [`TimedOut`](crate::Error::TimedOut) error
    #[default]
    Fail,
    /// Return `Ok(false)`
    ReturnFalse,
}

/// Configuration for waiting on an asynchronous state transition.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay after the first unsuccessful check
    pub initial: Duration,
    /// Multiplier applied to the delay after every sleep
    pub factor: f64,
    /// Maximum number of predicate evaluations
    pub max_tries: u32,
    /// Behavior once `max_tries` evaluations all returned false
    pub on_timeout: TimeoutPolicy,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(10),
            factor: 1.0,
            max_tries: 60,
            on_timeout: TimeoutPolicy::Fail,
        }
    }
}

impl PollConfig {
    /// Create a poll config that fails on timeout.
    pub fn new(initial: Duration, factor: f64, max_tries: u32) -> Self {
        Self {
            initial,
            factor,
            max_tries,
            on_timeout: TimeoutPolicy::Fail,
        }
    }

    /// Return `false` instead of failing on timeout.
    pub fn or_false(mut self) -> Self {
        self.on_timeout = TimeoutPolicy::ReturnFalse;
        self
    }
}
