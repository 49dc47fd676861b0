use anyhow::{Result, bail};
use attrstore::{Scope, StateStore};
use colored::Colorize;
use reconcile::{ConfirmCallback, LifecycleStatus, ResourceState};
use serde_json::json;
use std::sync::Arc;

use crate::Context;
use crate::commands::{open_store, with_locked_store};
use crate::ui;

/// Deployment attribute holding the human-readable name
pub const NAME_ATTR: &str = "name";

/// One line of `stratus info`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRow {
    pub name: String,
    pub resource_type: String,
    pub status: LifecycleStatus,
    pub resource_id: Option<String>,
    pub obsolete: bool,
}

// ============================================================================
// Commands
// ============================================================================

pub fn list(ctx: &Context) -> Result<()> {
    let store = open_store(ctx)?;
    let deployments = store.deployments()?;

    if deployments.is_empty() {
        if !ctx.quiet {
            ui::dim(&format!("No deployments in {}", ctx.state_file.display()));
        }
        return Ok(());
    }

    println!(
        "{} {} {}",
        ui::cell("UUID", 36).bold(),
        ui::cell("NAME", 24).bold(),
        "RESOURCES".bold()
    );
    for d in deployments {
        println!(
            "{} {} {}",
            ui::cell(&d.uuid, 36),
            ui::cell(d.name.as_deref().unwrap_or("-"), 24),
            d.resource_count
        );
    }
    Ok(())
}

pub fn info(ctx: &Context, deployment: Option<&str>) -> Result<()> {
    let key = ctx.config.deployment(deployment)?;
    let store = open_store(ctx)?;
    let record = store.find_deployment(key)?;
    let rows = resource_rows(&store, &record.uuid)?;

    ui::header(&format!("Deployment {}", record.uuid));
    ui::kv("Name", record.name.as_deref().unwrap_or("-"));
    ui::kv("Resources", &rows.len().to_string());

    if rows.is_empty() {
        return Ok(());
    }

    println!();
    println!(
        "{} {} {} {} {}",
        ui::cell("NAME", 24).bold(),
        ui::cell("TYPE", 16).bold(),
        ui::cell("STATUS", 11).bold(),
        ui::cell("RESOURCE ID", 24).bold(),
        "OBSOLETE".bold()
    );
    for row in rows {
        let status = ui::status(row.status);
        println!(
            "{} {} {}{} {} {}",
            ui::cell(&row.name, 24),
            ui::cell(&row.resource_type, 16),
            status,
            " ".repeat(11usize.saturating_sub(row.status.as_str().len())),
            ui::cell(row.resource_id.as_deref().unwrap_or("-"), 24),
            if row.obsolete { "yes" } else { "no" }
        );
    }
    Ok(())
}

pub fn create(ctx: &Context, name: Option<&str>) -> Result<()> {
    let uuid = with_locked_store(ctx, |store| create_deployment(store, name))?;
    if ctx.quiet {
        println!("{uuid}");
    } else {
        ui::success(&format!("Created deployment {uuid}"));
    }
    Ok(())
}

pub fn delete(ctx: &Context, deployment: Option<&str>, force: bool, yes: bool) -> Result<()> {
    let key = ctx.config.deployment(deployment)?;
    let mut confirm = ui::TerminalConfirm::new(yes);

    let deleted = with_locked_store(ctx, |store| {
        delete_deployment(store, key, force, &mut confirm)
    })?;

    match deleted {
        Some(uuid) => ui::success(&format!("Deleted deployment {uuid}")),
        None => ui::info("Cancelled"),
    }
    Ok(())
}

// ============================================================================
// Store operations
// ============================================================================

/// Resources of `uuid` with their persisted status, in declaration order
pub fn resource_rows(store: &Arc<StateStore>, uuid: &str) -> Result<Vec<ResourceRow>> {
    store
        .resources(uuid)?
        .into_iter()
        .map(|record| {
            let state = ResourceState::from_record(store, record);
            Ok(ResourceRow {
                name: state.name().to_string(),
                resource_type: state.resource_type().to_string(),
                status: state.status()?,
                resource_id: state.resource_id()?,
                obsolete: state.is_obsolete()?,
            })
        })
        .collect()
}

/// Create an empty deployment, optionally named
pub fn create_deployment(store: &Arc<StateStore>, name: Option<&str>) -> Result<String> {
    if let Some(name) = name
        && store
            .deployments()?
            .iter()
            .any(|d| d.name.as_deref() == Some(name))
    {
        bail!("A deployment named '{name}' already exists");
    }

    let uuid = store.create_deployment(None)?;
    if let Some(name) = name {
        store
            .attrs(Scope::Deployment(uuid.clone()))
            .set(NAME_ATTR, json!(name))?;
    }
    log::info!("Created deployment {uuid}");
    Ok(uuid)
}

/// Delete a deployment; returns its UUID, or `None` if the prompt was declined
///
/// Refuses while any resource is not MISSING unless `force` is set, since
/// the remote objects would be orphaned.
pub fn delete_deployment(
    store: &Arc<StateStore>,
    key: &str,
    force: bool,
    confirm: &mut dyn ConfirmCallback,
) -> Result<Option<String>> {
    let record = store.find_deployment(key)?;
    let live: Vec<String> = resource_rows(store, &record.uuid)?
        .into_iter()
        .filter(|row| row.status != LifecycleStatus::Missing)
        .map(|row| row.name)
        .collect();

    if !live.is_empty() {
        if !force {
            bail!(
                "Deployment {} still has resources that may exist: {}. \
                 Destroy them first or pass --force",
                record.uuid,
                live.join(", ")
            );
        }
        log::warn!(
            "Forgetting resources that may still exist: {}",
            live.join(", ")
        );
    }

    let prompt = format!(
        "Delete deployment {} and its {} resource record(s)?",
        record.uuid, record.resource_count
    );
    if !confirm.confirm(&prompt)? {
        return Ok(None);
    }

    store.purge_deployment(&record.uuid)?;
    Ok(Some(record.uuid))
}
