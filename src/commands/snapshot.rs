use anyhow::{Context as AnyhowContext, Result, bail};
use attrstore::{DeploymentSnapshot, StateStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::{Read, Write};

use crate::Context;
use crate::commands::{open_store, with_locked_store};
use crate::ui;

/// What `export` writes and `import` accepts: one snapshot or a list
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Snapshots {
    One(DeploymentSnapshot),
    Many(Vec<DeploymentSnapshot>),
}

impl Snapshots {
    pub fn into_vec(self) -> Vec<DeploymentSnapshot> {
        match self {
            Self::One(snapshot) => vec![snapshot],
            Self::Many(snapshots) => snapshots,
        }
    }
}

pub fn export(ctx: &Context, deployment: Option<&str>) -> Result<()> {
    let store = open_store(ctx)?;
    let snapshots = export_snapshots(&store, deployment)?;

    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &snapshots).context("Failed to write snapshot")?;
    writeln!(stdout)?;
    Ok(())
}

pub fn import(ctx: &Context) -> Result<()> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("Failed to read snapshot from stdin")?;

    let imported = with_locked_store(ctx, |store| import_snapshots(store, &input))?;
    if imported.is_empty() {
        ui::info("Nothing to import");
    }
    for uuid in imported {
        ui::success(&format!("Imported deployment {uuid}"));
    }
    Ok(())
}

/// Snapshot of one deployment, or of every deployment when `key` is `None`
pub fn export_snapshots(store: &StateStore, key: Option<&str>) -> Result<Snapshots> {
    if let Some(key) = key {
        let record = store.find_deployment(key)?;
        return Ok(Snapshots::One(store.export_deployment(&record.uuid)?));
    }

    let snapshots = store
        .deployments()?
        .iter()
        .map(|d| store.export_deployment(&d.uuid))
        .collect::<attrstore::Result<Vec<_>>>()?;
    Ok(Snapshots::Many(snapshots))
}

/// Import every snapshot in `json`; returns the new deployments' UUIDs
///
/// The batch is imported in one transaction: nothing is imported if any UUID
/// is already present or appears twice in the input.
pub fn import_snapshots(store: &StateStore, json: &str) -> Result<Vec<String>> {
    let snapshots = serde_json::from_str::<Snapshots>(json)
        .context("Input is not a deployment snapshot")?
        .into_vec();

    let mut seen = BTreeSet::new();
    let repeated: BTreeSet<&str> = snapshots
        .iter()
        .map(|s| s.uuid.as_str())
        .filter(|uuid| !seen.insert(*uuid))
        .collect();
    if !repeated.is_empty() {
        bail!(
            "Duplicate deployments in input: {}",
            repeated.into_iter().collect::<Vec<_>>().join(", ")
        );
    }

    let existing = store.deployments()?;
    let clashes: Vec<&str> = snapshots
        .iter()
        .filter(|s| existing.iter().any(|d| d.uuid == s.uuid))
        .map(|s| s.uuid.as_str())
        .collect();
    if !clashes.is_empty() {
        bail!("Deployments already exist: {}", clashes.join(", "));
    }

    store
        .import_deployments(&snapshots)
        .context("Failed to import deployments")
}
