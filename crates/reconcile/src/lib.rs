//! # Reconcile
//!
//! The reconciliation engine: diff a desired [`Definition`] against a
//! resource's persisted state and run the handlers that cover the change.
//!
//! ## Core Concepts
//!
//! - **Definition**: immutable desired configuration of one resource
//! - **ResourceState**: the persisted counterpart, backed by [`attrstore`]
//! - **Handler**: owns a set of configuration keys and runs after other handlers
//! - **DiffEngine**: classifies changed keys and picks the smallest handler
//!   combination covering them, in dependency order
//! - **converge**: the reference driver tying it all together
//!
//! ## Example
//!
//! ```ignore
//! use reconcile::{HandlerRegistry, Definition, DiffEngine, Unresolved, default_reserved_keys};
//!
//! let registry = HandlerRegistry::<Disk>::builder()
//!     .handler("create", &["region"], &[], Disk::create_disk)
//!     .handler("resize", &["size"], &["create"], Disk::resize)
//!     .build()?;
//!
//! let reserved = default_reserved_keys();
//! let engine = DiffEngine::new("disk", &registry, &reserved);
//! let defn = Definition::new("data", "disk").with("size", 100);
//! let diff = engine.diff(&defn, &disk.state().snapshot()?, &Unresolved)?;
//! for handler in engine.plan(&diff, true)?.iter() {
//!     handler.handle(&disk, &defn, Default::default())?;
//! }
//! ```
//!
//! ## Provider Traits
//!
//! The crate uses traits for dependency injection:
//!
//! - [`ReferenceResolver`]: Resolves references to other resources' outputs
//! - [`ProgressCallback`]: Receives progress updates
//! - [`ConfirmCallback`]: Handles user confirmations
//!
//! Sleeping, retry and polling policies come from a shared [`Services`].

pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod handler;
pub mod planner;
pub mod resource;
pub mod state;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export main types at crate root
pub use context::{
    AutoConfirm, AutoDecline, ConfirmCallback, NoProgress, ProgressCallback, Services,
};
pub use diff::{
    Desired, Diff, DiffKind, DiffSummary, KeyDiff, ReferenceResolver, Resolution, StoreResolver,
    Unresolved, compute_diff,
};
pub use error::{ConsentFlag, Error, ErrorKind, Result};
pub use executor::{check_all, converge, dry_run};
pub use handler::{Handler, HandlerFn, HandlerRegistry, HandlerRegistryBuilder};
pub use planner::{DiffEngine, Plan};
pub use resource::{
    DEPLOYMENT_TAG, HandlerDriven, Identifiable, RESOURCE_TAG, Resource, Retryable, Taggable,
};
pub use state::{
    CREATION_TIME_KEY, INDEX_KEY, OBSOLETE_KEY, RESOURCE_ID_KEY, ResourceState, STATUS_KEY,
    default_reserved_keys, read_status, write_status,
};
pub use types::{
    AttrMap, CheckReport, ConvergeSummary, CreateOptions, Definition, Drift, HandleOptions,
    LifecycleStatus, ResourceRef, Setting, Value,
};
