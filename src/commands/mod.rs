//! Subcommand implementations
//!
//! Every command works on the state file only; nothing here talks to a
//! provider. Commands that write run under the exclusive store lock.

pub mod deployments;
pub mod resources;
pub mod snapshot;

use anyhow::{Context as AnyhowContext, Result};
use attrstore::StateStore;
use std::sync::Arc;

use crate::Context;

/// Open the state file selected for this invocation
pub(crate) fn open_store(ctx: &Context) -> Result<Arc<StateStore>> {
    StateStore::open(&ctx.state_file)
        .with_context(|| format!("Could not open state file {}", ctx.state_file.display()))
}

/// Run `f` on the store while holding the exclusive store lock
pub(crate) fn with_locked_store<T, F>(ctx: &Context, f: F) -> Result<T>
where
    F: FnOnce(&Arc<StateStore>) -> Result<T>,
{
    lockkit::with_store_lock(&ctx.state_file, || {
        let store = open_store(ctx)?;
        f(&store)
    })
}
