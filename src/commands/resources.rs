use anyhow::{Result, bail};
use attrstore::StateStore;
use reconcile::{ConfirmCallback, LifecycleStatus, ResourceState};
use std::sync::Arc;

use crate::Context;
use crate::commands::with_locked_store;
use crate::ui;

pub fn rename(ctx: &Context, deployment: Option<&str>, from: &str, to: &str) -> Result<()> {
    let key = ctx.config.deployment(deployment)?;
    with_locked_store(ctx, |store| rename_resource(store, key, from, to))?;
    ui::success(&format!("Renamed '{from}' to '{to}'"));
    Ok(())
}

pub fn purge(ctx: &Context, deployment: Option<&str>, resource: &str, yes: bool) -> Result<()> {
    let key = ctx.config.deployment(deployment)?;
    let mut confirm = ui::TerminalConfirm::new(yes);

    if with_locked_store(ctx, |store| purge_resource(store, key, resource, &mut confirm))? {
        ui::success(&format!("Purged resource '{resource}'"));
    } else {
        ui::info("Cancelled");
    }
    Ok(())
}

/// Rename a resource record; the provider object is unaffected
pub fn rename_resource(store: &Arc<StateStore>, key: &str, from: &str, to: &str) -> Result<()> {
    if to.trim().is_empty() {
        bail!("Resource name cannot be empty");
    }
    let record = store.find_deployment(key)?;
    store.rename_resource(&record.uuid, from, to)?;
    Ok(())
}

/// Remove one resource record and its attributes
///
/// Returns `false` if the prompt was declined. A resource that is not
/// MISSING is only forgotten, not destroyed, so the prompt says so.
pub fn purge_resource(
    store: &Arc<StateStore>,
    key: &str,
    name: &str,
    confirm: &mut dyn ConfirmCallback,
) -> Result<bool> {
    let record = store.find_deployment(key)?;
    let Some(state) = ResourceState::load(store, &record.uuid, name)? else {
        bail!("Resource '{name}' not found in deployment {}", record.uuid);
    };

    let status = state.status()?;
    let prompt = if status == LifecycleStatus::Missing {
        format!("Purge resource '{name}'?")
    } else {
        let id = state.resource_id()?.unwrap_or_else(|| "-".to_string());
        format!("Resource '{name}' is {status} (id {id}); forget it without destroying it?")
    };
    if !confirm.confirm(&prompt)? {
        return Ok(false);
    }

    state.purge()?;
    Ok(true)
}
