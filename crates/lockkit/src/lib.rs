//! # lockkit
//!
//! Concurrency primitives for long-running, partially failing remote work.
//!
//! This crate provides:
//! - [`StoreLock`]: an exclusive advisory lock over a whole state file, so
//!   two processes never reconcile the same state concurrently
//! - [`MutexRegistry`]: lazily created in-process mutexes keyed by
//!   composite keys, serializing operations on one backing remote object
//! - [`with_retry`]: randomized exponential backoff for transient failures
//! - [`poll_until`]: waiting for asynchronous provider state transitions
//!
//! Everything here blocks the calling thread; there is no cancellation.
//!
//! ## Example
//!
//! ```no_run
//! use lockkit::{with_retry, with_store_lock, RetryConfig, RetryDecision, ThreadSleeper};
//! use std::path::Path;
//!
//! with_store_lock(Path::new("/tmp/state.db"), || {
//!     let id = with_retry(
//!         &RetryConfig::default(),
//!         &ThreadSleeper,
//!         |_e: &std::io::Error| RetryDecision::Retry,
//!         None,
//!         || std::fs::read_to_string("/tmp/instance-id"),
//!     )?;
//!     println!("instance {id}");
//!     Ok::<_, Box<dyn std::error::Error>>(())
//! })?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod mutex;
pub mod poll;
pub mod retry;
pub mod sleep;
pub mod store_lock;
pub mod types;

pub use error::{Error, Result};
pub use mutex::{LockKey, MutexRegistry};
pub use poll::{poll_until, poll_until_ok};
pub use retry::{LogCallback, NoCallback, RetryCallback, with_retry};
pub use sleep::{RecordingSleeper, Sleeper, ThreadSleeper};
pub use store_lock::{StoreLock, with_store_lock};
pub use types::{PollConfig, RetryConfig, RetryDecision, TimeoutPolicy};
