//! Process-scoped services and callback traits
//!
//! These traits keep the engine free of UI concerns: confirmations and
//! progress display are injected by the driver.

use crate::error::{Error, Result};
use lockkit::{
    LockKey, LogCallback, MutexRegistry, PollConfig, RetryConfig, Sleeper, ThreadSleeper,
    poll_until_ok, with_retry,
};
use std::fmt;
use std::sync::Arc;

/// Progress callback for converge operations
///
/// Implement this trait to receive progress updates while handlers run.
pub trait ProgressCallback: Send {
    /// Called once the plan of a resource is known
    fn on_plan(&mut self, resource: &str, handlers: &[&str]);

    /// Called before a handler runs
    fn on_handler_start(&mut self, resource: &str, handler: &str);

    /// Called after a handler ran, with its error if it failed
    fn on_handler_complete(&mut self, resource: &str, handler: &str, error: Option<&Error>);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_plan(&mut self, _resource: &str, _handlers: &[&str]) {}
    fn on_handler_start(&mut self, _resource: &str, _handler: &str) {}
    fn on_handler_complete(&mut self, _resource: &str, _handler: &str, _error: Option<&Error>) {}
}

/// Confirmation callback for user interaction
///
/// Implement this trait to handle user confirmations.
pub trait ConfirmCallback: Send {
    /// Ask the user to confirm an action
    ///
    /// # Returns
    /// `true` if the user confirmed, `false` otherwise
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(false)
    }
}

/// Shared services handed to every resource of a process
///
/// Holds the composite-key mutex registry and the retry and poll policies,
/// plus the sleeper they block on.
pub struct Services {
    pub mutexes: MutexRegistry,
    pub retry: RetryConfig,
    pub poll: PollConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl Default for Services {
    fn default() -> Self {
        Self::new(RetryConfig::default(), PollConfig::default())
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("mutexes", &self.mutexes)
            .field("retry", &self.retry)
            .field("poll", &self.poll)
            .finish_non_exhaustive()
    }
}

impl Services {
    pub fn new(retry: RetryConfig, poll: PollConfig) -> Self {
        Self {
            mutexes: MutexRegistry::new(),
            retry,
            poll,
            sleeper: Arc::new(ThreadSleeper),
        }
    }

    /// Replace the sleeper, e.g. with a [`lockkit::RecordingSleeper`] in tests
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn sleeper(&self) -> &dyn Sleeper {
        self.sleeper.as_ref()
    }

    /// Run a remote call under `policy`, retrying what the error taxonomy
    /// classifies as transient
    pub fn retry<T, F>(&self, label: &str, policy: &RetryConfig, op: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        with_retry(
            policy,
            self.sleeper(),
            Error::retry_decision,
            Some(&LogCallback { label }),
            op,
        )
    }

    /// Poll `predicate` with the shared poll policy
    pub fn poll<F>(&self, what: &str, predicate: F) -> Result<bool>
    where
        F: FnMut() -> Result<bool>,
    {
        poll_until_ok(&self.poll, self.sleeper(), what, predicate)
    }

    /// Run `f` holding the process-wide mutex for `key`
    pub fn exclusive<T>(&self, key: &LockKey, f: impl FnOnce() -> T) -> T {
        self.mutexes.with_lock(key, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockkit::RecordingSleeper;
    use std::cell::Cell;
    use std::time::Duration;

    fn services() -> (Services, Arc<RecordingSleeper>) {
        let sleeper = Arc::new(RecordingSleeper::new());
        let services = Services::new(
            RetryConfig::new(4, Duration::from_secs(1), Duration::from_millis(10)),
            PollConfig::new(Duration::from_secs(2), 2.0, 3),
        )
        .with_sleeper(sleeper.clone());
        (services, sleeper)
    }

    #[test]
    fn test_retry_classifies_with_taxonomy() {
        let (services, sleeper) = services();
        let calls = Cell::new(0);

        let out = services.retry("web", &services.retry, || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(Error::transient("web", "connection reset"))
            } else {
                Ok("i-1")
            }
        });
        assert_eq!(out.unwrap(), "i-1");
        assert_eq!(sleeper.count(), 2);
    }

    #[test]
    fn test_retry_stops_on_permanent() {
        let (services, sleeper) = services();
        let calls = Cell::new(0);

        let out: Result<()> = services.retry("web", &services.retry, || {
            calls.set(calls.get() + 1);
            Err(Error::provider("web", "InvalidParameterValue"))
        });
        assert!(matches!(out, Err(Error::Provider { .. })));
        assert_eq!(calls.get(), 1);
        assert_eq!(sleeper.count(), 0);
    }

    #[test]
    fn test_poll_timeout_surfaces_as_lock_error() {
        let (services, sleeper) = services();

        let err = services.poll("disk detached", || Ok(false)).unwrap_err();
        assert!(matches!(err, Error::Lock(lockkit::Error::TimedOut { tries: 3, .. })));
        assert_eq!(
            sleeper.sleeps(),
            [Duration::from_secs(2), Duration::from_secs(4)]
        );
    }

    #[test]
    fn test_exclusive_returns_value() {
        let (services, _) = services();
        let key = LockKey::new(["hosted-service", "web"]);
        assert_eq!(services.exclusive(&key, || 42), 42);
        assert_eq!(services.mutexes.len(), 1);
    }

    #[test]
    fn test_confirm_callbacks() {
        assert!(AutoConfirm.confirm("Wipe?").unwrap());
        assert!(!AutoDecline.confirm("Wipe?").unwrap());
    }
}
