//! Sleeping as an injectable capability.

use std::sync::Mutex;
use std::thread;
use std::time::Duration;

/// Something that can block the calling thread for a while.
pub trait Sleeper: Send + Sync {
    /// Block for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Sleeps on the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Records requested sleeps without blocking.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every duration requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        match self.slept.lock() {
            Ok(slept) => slept.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Number of sleeps requested so far.
    pub fn count(&self) -> usize {
        self.sleeps().len()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        match self.slept.lock() {
            Ok(mut slept) => slept.push(duration),
            Err(poisoned) => poisoned.into_inner().push(duration),
        }
    }
}
