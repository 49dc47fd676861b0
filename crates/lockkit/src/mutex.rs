//! Process-wide registry of mutexes keyed by composite keys.
//!
//! Some provider operations must not run concurrently against the same
//! backing object (for example two deployments into one hosted service
//! slot). The registry hands out one mutex per key, created on first use, so
//! callers do not need to know the set of keys ahead of time.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// A composite key such as `["hosted-service", "web", "production"]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LockKey(Vec<String>);

impl LockKey {
    /// Build a key from its parts.
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    /// The key's parts, in order.
    pub fn parts(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

impl From<&str> for LockKey {
    fn from(key: &str) -> Self {
        Self::new([key])
    }
}

/// Lazily populated map from [`LockKey`] to mutex.
#[derive(Debug, Default)]
pub struct MutexRegistry {
    master: Mutex<HashMap<LockKey, Arc<Mutex<()>>>>,
}

impl MutexRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The mutex for `key`, created under the master lock on first use.
    pub fn mutex_for(&self, key: &LockKey) -> Arc<Mutex<()>> {
        let mut map = lock_ignoring_poison(&self.master);
        Arc::clone(map.entry(key.clone()).or_insert_with(|| {
            log::trace!("Creating mutex for {key}");
            Arc::new(Mutex::new(()))
        }))
    }

    /// Run `f` while holding the mutex for `key`.
    ///
    /// A panic in an earlier holder does not prevent later callers from
    /// taking the lock.
    pub fn with_lock<T>(&self, key: &LockKey, f: impl FnOnce() -> T) -> T {
        let mutex = self.mutex_for(key);
        let _guard = lock_ignoring_poison(&mutex);
        f()
    }

    /// Number of keys seen so far.
    pub fn len(&self) -> usize {
        lock_ignoring_poison(&self.master).len()
    }

    /// Whether no key has been requested yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lock_ignoring_poison<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
