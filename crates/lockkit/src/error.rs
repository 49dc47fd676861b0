//! Error types for locking and polling.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while locking or waiting.
#[derive(Debug, Error)]
pub enum Error {
    /// The lock file could not be opened or created
    #[error("cannot open lock file {}: {source}", .path.display())]
    LockFile {
        /// Path of the lock file
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// flock(2) failed for a reason other than contention
    #[error("cannot lock {}: {source}", .path.display())]
    Lock {
        /// Path of the lock file
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// A polled condition never became true
    #[error("timed out waiting for {what} after {tries} tries")]
    TimedOut {
        /// Description of the awaited condition
        what: String,
        /// Number of times the predicate was evaluated
        tries: u32,
    },
}

/// Result type for lockkit operations.
pub type Result<T> = std::result::Result<T, Error>;
