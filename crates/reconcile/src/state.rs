//! Persisted state of one resource instance
//!
//! Identity lives in the resource row; everything else (status, index,
//! obsolete flag, provider identity and the resource's own outputs) is an
//! attribute in the store.

use crate::error::{Error, Result};
use crate::types::{AttrMap, LifecycleStatus, Value};
use attrstore::{AttrView, Attrs, ResourceRecord, StateStore};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Lifecycle status, stored as its ordinal
pub const STATUS_KEY: &str = "state";
/// Display index among resources of a deployment
pub const INDEX_KEY: &str = "index";
/// Set when the resource is scheduled for removal
pub const OBSOLETE_KEY: &str = "obsolete";
/// Provider identifier, absent until first created
pub const RESOURCE_ID_KEY: &str = "resourceId";
/// Unix time of the first successful creation
pub const CREATION_TIME_KEY: &str = "creationTime";

/// Keys that never take part in diffing
pub fn default_reserved_keys() -> BTreeSet<String> {
    [
        STATUS_KEY,
        INDEX_KEY,
        OBSOLETE_KEY,
        RESOURCE_ID_KEY,
        CREATION_TIME_KEY,
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn decode_status(resource: &str, raw: Option<Value>) -> Result<LifecycleStatus> {
    let Some(raw) = raw else {
        return Ok(LifecycleStatus::Missing);
    };
    raw.as_i64()
        .and_then(LifecycleStatus::from_ordinal)
        .ok_or_else(|| Error::CorruptStatus {
            resource: resource.to_string(),
            value: raw.to_string(),
        })
}

/// Read the status inside a transaction; a status never written reads as
/// [`LifecycleStatus::Missing`]
pub fn read_status(view: &AttrView<'_>, resource: &str) -> Result<LifecycleStatus> {
    decode_status(resource, view.get(STATUS_KEY)?)
}

/// Write the status inside a transaction
pub fn write_status(view: &AttrView<'_>, status: LifecycleStatus) -> Result<()> {
    view.set(STATUS_KEY, Value::from(status.ordinal()))?;
    Ok(())
}

/// A resource row plus its attribute handle
#[derive(Debug, Clone)]
pub struct ResourceState {
    record: ResourceRecord,
    attrs: Attrs,
}

impl ResourceState {
    /// Declare (or look up) the resource `name` in `deployment`
    pub fn declare(
        store: &Arc<StateStore>,
        deployment: &str,
        name: &str,
        resource_type: &str,
    ) -> Result<Self> {
        let record = store.declare_resource(deployment, name, resource_type)?;
        Ok(Self::from_record(store, record))
    }

    /// Load an already declared resource
    pub fn load(store: &Arc<StateStore>, deployment: &str, name: &str) -> Result<Option<Self>> {
        Ok(store
            .find_resource(deployment, name)?
            .map(|record| Self::from_record(store, record)))
    }

    pub fn from_record(store: &Arc<StateStore>, record: ResourceRecord) -> Self {
        let attrs = store.attrs(record.scope());
        Self { record, attrs }
    }

    pub fn record(&self) -> &ResourceRecord {
        &self.record
    }

    pub fn id(&self) -> i64 {
        self.record.id
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn deployment(&self) -> &str {
        &self.record.deployment
    }

    pub fn resource_type(&self) -> &str {
        &self.record.resource_type
    }

    /// Raw attribute access
    pub fn attrs(&self) -> &Attrs {
        &self.attrs
    }

    pub fn store(&self) -> &Arc<StateStore> {
        self.attrs.store()
    }

    pub fn status(&self) -> Result<LifecycleStatus> {
        decode_status(self.name(), self.attrs.get(STATUS_KEY)?)
    }

    pub fn set_status(&self, status: LifecycleStatus) -> Result<()> {
        log::debug!("{}: status -> {}", self.name(), status);
        self.attrs
            .set(STATUS_KEY, Value::from(status.ordinal()))
            .map_err(Error::from)
    }

    pub fn index(&self) -> Result<Option<i64>> {
        Ok(self.attrs.get_as(INDEX_KEY)?)
    }

    pub fn set_index(&self, index: i64) -> Result<()> {
        Ok(self.attrs.set(INDEX_KEY, Value::from(index))?)
    }

    /// Whether the resource is scheduled for removal; unset means false
    pub fn is_obsolete(&self) -> Result<bool> {
        Ok(self.attrs.get_as(OBSOLETE_KEY)?.unwrap_or(false))
    }

    pub fn set_obsolete(&self, obsolete: bool) -> Result<()> {
        Ok(self.attrs.set(OBSOLETE_KEY, Value::from(obsolete))?)
    }

    /// Provider identifier, if the resource has been created
    pub fn resource_id(&self) -> Result<Option<String>> {
        Ok(self.attrs.get_as(RESOURCE_ID_KEY)?)
    }

    /// Record a freshly created resource
    ///
    /// The provider identifier, the creation time and `outputs` are written
    /// in one transaction.
    pub fn record_created(&self, resource_id: &str, outputs: &AttrMap) -> Result<()> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        self.attrs.transaction(|view| {
            view.set(RESOURCE_ID_KEY, Value::from(resource_id))?;
            view.set(CREATION_TIME_KEY, Value::from(now))?;
            view.set_many(outputs.clone())?;
            Ok::<_, Error>(())
        })
    }

    /// All attributes, reserved ones included
    pub fn snapshot(&self) -> Result<AttrMap> {
        Ok(self.attrs.export()?)
    }

    /// Run `f` inside one store transaction
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&AttrView<'_>) -> Result<T>,
    {
        self.attrs.transaction(f)
    }

    /// Reset to the never-created state
    ///
    /// Clears the provider identity, the creation time and `extra_keys`,
    /// then sets the status to MISSING, all in one transaction. The row and
    /// the remaining attributes are kept.
    pub fn mark_destroyed(&self, extra_keys: &[&str]) -> Result<()> {
        self.transaction(|view| {
            for key in [RESOURCE_ID_KEY, CREATION_TIME_KEY]
                .iter()
                .chain(extra_keys)
            {
                view.delete(key)?;
            }
            write_status(view, LifecycleStatus::Missing)
        })?;
        log::debug!("{}: marked destroyed", self.name());
        Ok(())
    }

    /// Remove the row and every attribute
    pub fn purge(self) -> Result<()> {
        log::debug!("Purging resource {}", self.name());
        Ok(self.store().purge_resource(self.record.id)?)
    }
}
