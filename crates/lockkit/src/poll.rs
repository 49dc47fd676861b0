//! Waiting for asynchronous state transitions.
//!
//! Remote operations such as "detach a disk" return before the provider has
//! finished. These helpers re-evaluate a predicate with increasing delays
//! until it holds or the try budget runs out.

use crate::error::{Error, Result};
use crate::sleep::Sleeper;
use crate::types::{PollConfig, TimeoutPolicy};
use std::time::Duration;

/// Poll an infallible predicate until it returns true.
///
/// Returns `Ok(true)` as soon as the predicate holds. Once `max_tries`
/// evaluations returned false the outcome depends on
/// [`PollConfig::on_timeout`]: `Ok(false)` or [`Error::TimedOut`].
pub fn poll_until<F>(config: &PollConfig, sleeper: &dyn Sleeper, what: &str, mut predicate: F) -> Result<bool>
where
    F: FnMut() -> bool,
{
    poll_until_ok(config, sleeper, what, || Ok::<_, Error>(predicate()))
}

/// Poll a fallible predicate until it returns `Ok(true)`.
///
/// An error from the predicate is returned immediately. The predicate is
/// evaluated at least once, even with `max_tries` set to zero.
pub fn poll_until_ok<F, E>(
    config: &PollConfig,
    sleeper: &dyn Sleeper,
    what: &str,
    mut predicate: F,
) -> std::result::Result<bool, E>
where
    F: FnMut() -> std::result::Result<bool, E>,
    E: From<Error>,
{
    let max_tries = config.max_tries.max(1);
    let mut delay = config.initial;

    for attempt in 1..=max_tries {
        if predicate()? {
            return Ok(true);
        }
        if attempt == max_tries {
            break;
        }

        log::debug!(
            "Waiting for {what} (try {attempt}/{max_tries}), next check in {:.1}s",
            delay.as_secs_f64()
        );
        sleeper.sleep(delay);
        delay = grow(delay, config.factor);
    }

    match config.on_timeout {
        TimeoutPolicy::ReturnFalse => Ok(false),
        TimeoutPolicy::Fail => Err(Error::TimedOut {
            what: what.to_string(),
            tries: max_tries,
        }
        .into()),
    }
}

/// Next delay, saturating at `Duration::MAX`; negative or NaN factors give zero
fn grow(delay: Duration, factor: f64) -> Duration {
    if delay.is_zero() {
        return delay;
    }
    Duration::try_from_secs_f64(delay.as_secs_f64() * factor.max(0.0)).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sleep::RecordingSleeper;

    #[test]
    fn test_ready_immediately() {
        let sleeper = RecordingSleeper::new();
        let config = PollConfig::new(Duration::from_secs(1), 2.0, 5);

        assert!(poll_until(&config, &sleeper, "disk", || true).unwrap());
        assert_eq!(sleeper.count(), 0);
    }

    #[test]
    fn test_delays_grow_by_factor() {
        let sleeper = RecordingSleeper::new();
        let config = PollConfig::new(Duration::from_secs(1), 2.0, 10);
        let mut checks = 0;

        let ready = poll_until(&config, &sleeper, "disk detach", || {
            checks += 1;
            checks == 4
        })
        .unwrap();

        assert!(ready);
        assert_eq!(
            sleeper.sleeps(),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
    }

    #[test]
    fn test_timeout_fails_by_default() {
        let sleeper = RecordingSleeper::new();
        let config = PollConfig::new(Duration::from_millis(5), 1.0, 3);

        let err = poll_until(&config, &sleeper, "instance stop", || false).unwrap_err();
        assert!(matches!(err, Error::TimedOut { tries: 3, .. }));
        assert!(err.to_string().contains("instance stop"));
        assert_eq!(sleeper.count(), 2);
    }

    #[test]
    fn test_timeout_can_return_false() {
        let sleeper = RecordingSleeper::new();
        let config = PollConfig::new(Duration::from_millis(5), 1.0, 3).or_false();

        assert!(!poll_until(&config, &sleeper, "instance stop", || false).unwrap());
    }

    #[test]
    fn test_predicate_error_propagates() {
        #[derive(Debug)]
        enum CheckError {
            Gone,
            Wait(Error),
        }
        impl From<Error> for CheckError {
            fn from(e: Error) -> Self {
                Self::Wait(e)
            }
        }

        let sleeper = RecordingSleeper::new();
        let config = PollConfig::new(Duration::from_millis(5), 1.0, 3);
        let result = poll_until_ok(&config, &sleeper, "volume", || Err(CheckError::Gone));

        assert!(matches!(result, Err(CheckError::Gone)));
        assert_eq!(sleeper.count(), 0);
    }

    #[test]
    fn test_long_growth_saturates() {
        let sleeper = RecordingSleeper::new();
        let config = PollConfig::new(Duration::from_secs(1), 2.0, 80).or_false();

        assert!(!poll_until(&config, &sleeper, "snapshot", || false).unwrap());
        let sleeps = sleeper.sleeps();
        assert_eq!(sleeps.len(), 79);
        assert_eq!(sleeps.last(), Some(&Duration::MAX));
    }

    #[test]
    fn test_odd_factors_do_not_panic() {
        assert_eq!(grow(Duration::from_secs(3), -1.0), Duration::ZERO);
        assert_eq!(grow(Duration::from_secs(3), f64::NAN), Duration::ZERO);
        assert_eq!(grow(Duration::from_secs(3), f64::INFINITY), Duration::MAX);
        assert_eq!(grow(Duration::ZERO, f64::INFINITY), Duration::ZERO);
    }

    #[test]
    fn test_zero_tries_checks_once() {
        let sleeper = RecordingSleeper::new();
        let config = PollConfig::new(Duration::from_secs(1), 1.0, 0);
        let mut checks = 0;

        let err = poll_until(&config, &sleeper, "address", || {
            checks += 1;
            false
        })
        .unwrap_err();
        assert_eq!(checks, 1);
        assert!(matches!(err, Error::TimedOut { tries: 1, .. }));
        assert_eq!(sleeper.count(), 0);

        assert!(poll_until(&config, &sleeper, "address", || true).unwrap());
    }
}
