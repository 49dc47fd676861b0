//! Diff computation between a definition and persisted state

use crate::error::{Error, Result};
use crate::state::{ResourceState, read_status};
use crate::types::{AttrMap, Definition, LifecycleStatus, ResourceRef, Setting, Value};
use attrstore::StateStore;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// How a single key changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiffKind {
    /// In the definition, absent from state
    Set,
    /// In both, with different values
    Update,
    /// In state, absent from the definition
    Unset,
}

impl fmt::Display for DiffKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Set => f.write_str("set"),
            Self::Update => f.write_str("update"),
            Self::Unset => f.write_str("unset"),
        }
    }
}

/// Desired value of a key after reference resolution
#[derive(Debug, Clone, PartialEq)]
pub enum Desired {
    Value(Value),
    /// Points at an output that does not exist yet; never equal to a stored value
    Pending(ResourceRef),
}

impl fmt::Display for Desired {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => write!(f, "{value}"),
            Self::Pending(target) => write!(f, "<pending {target}>"),
        }
    }
}

/// The change to one key
#[derive(Debug, Clone, PartialEq)]
pub struct KeyDiff {
    pub key: String,
    pub kind: DiffKind,
    /// Value recorded in state
    pub current: Option<Value>,
    /// Value the definition asks for; `None` for [`DiffKind::Unset`]
    pub desired: Option<Desired>,
}

impl fmt::Display for KeyDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.current, &self.desired) {
            (Some(current), Some(desired)) => {
                write!(f, "{} {}: {} -> {}", self.kind, self.key, current, desired)
            }
            (None, Some(desired)) => write!(f, "{} {} = {}", self.kind, self.key, desired),
            (Some(current), None) => write!(f, "{} {} (was {})", self.kind, self.key, current),
            (None, None) => write!(f, "{} {}", self.kind, self.key),
        }
    }
}

/// Per-key changes of one resource, ordered by key
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diff {
    entries: BTreeMap<String, KeyDiff>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Every key that differs
    pub fn changed_keys(&self) -> BTreeSet<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn get(&self, key: &str) -> Option<&KeyDiff> {
        self.entries.get(key)
    }

    /// Kind of change for `key`, if it changed
    pub fn kind(&self, key: &str) -> Option<DiffKind> {
        self.entries.get(key).map(|d| d.kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeyDiff> {
        self.entries.values()
    }

    /// Key to kind map
    pub fn kinds(&self) -> BTreeMap<&str, DiffKind> {
        self.entries
            .iter()
            .map(|(key, diff)| (key.as_str(), diff.kind))
            .collect()
    }

    pub fn summary(&self) -> DiffSummary {
        DiffSummary::from_diff(self)
    }

    fn push(&mut self, diff: KeyDiff) {
        self.entries.insert(diff.key.clone(), diff);
    }
}

/// Diff summary statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffSummary {
    /// Keys to set
    pub sets: usize,
    /// Keys to update
    pub updates: usize,
    /// Keys to unset
    pub unsets: usize,
}

impl DiffSummary {
    pub fn from_diff(diff: &Diff) -> Self {
        let mut summary = Self::default();
        for entry in diff.iter() {
            match entry.kind {
                DiffKind::Set => summary.sets += 1,
                DiffKind::Update => summary.updates += 1,
                DiffKind::Unset => summary.unsets += 1,
            }
        }
        summary
    }

    /// Total number of changes
    pub fn total(&self) -> usize {
        self.sets + self.updates + self.unsets
    }

    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

impl fmt::Display for DiffSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to set, {} to update, {} to unset",
            self.sets, self.updates, self.unsets
        )
    }
}

/// Outcome of resolving a [`ResourceRef`]
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The target is UP and has the attribute
    Ready(Value),
    /// The target exists but has not produced the attribute yet
    Pending,
    /// The target is not declared at all
    Unknown,
}

/// Resolves references to other resources' outputs
pub trait ReferenceResolver: Send + Sync {
    fn resolve(&self, target: &ResourceRef) -> Result<Resolution>;
}

/// Resolves references against resources of one deployment in the store
#[derive(Debug, Clone)]
pub struct StoreResolver {
    store: Arc<StateStore>,
    deployment: String,
}

impl StoreResolver {
    pub fn new(store: Arc<StateStore>, deployment: impl Into<String>) -> Self {
        Self {
            store,
            deployment: deployment.into(),
        }
    }

    /// Resolver over the deployment `state` belongs to
    pub fn for_state(state: &ResourceState) -> Self {
        Self::new(Arc::clone(state.store()), state.deployment())
    }
}

impl ReferenceResolver for StoreResolver {
    fn resolve(&self, target: &ResourceRef) -> Result<Resolution> {
        let Some(record) = self.store.find_resource(&self.deployment, &target.resource)? else {
            return Ok(Resolution::Unknown);
        };

        let scope = record.scope();
        self.store.transaction(|tx| {
            let view = tx.attrs(&scope);
            if read_status(&view, &record.name)? != LifecycleStatus::Up {
                return Ok(Resolution::Pending);
            }
            Ok(view
                .get(&target.attribute)?
                .map_or(Resolution::Pending, Resolution::Ready))
        })
    }
}

/// Treats every reference as pending
///
/// For resources whose definitions carry no references, and for previews
/// without a store.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unresolved;

impl ReferenceResolver for Unresolved {
    fn resolve(&self, _target: &ResourceRef) -> Result<Resolution> {
        Ok(Resolution::Pending)
    }
}

fn desired_value(
    defn: &Definition,
    setting: &Setting,
    resolver: &dyn ReferenceResolver,
) -> Result<Option<Desired>> {
    match setting {
        Setting::Value(Value::Null) => Ok(None),
        Setting::Value(value) => Ok(Some(Desired::Value(value.clone()))),
        Setting::Reference { target } => match resolver.resolve(target)? {
            Resolution::Ready(value) => Ok(Some(Desired::Value(value))),
            Resolution::Pending => Ok(Some(Desired::Pending(target.clone()))),
            Resolution::Unknown => Err(Error::DanglingReference {
                resource: defn.name.clone(),
                target: target.resource.clone(),
            }),
        },
    }
}

/// Classify every non-reserved key of `defn` and `current`
///
/// A `null` literal in the definition means the key is unset.
pub fn compute_diff(
    defn: &Definition,
    current: &AttrMap,
    reserved: &BTreeSet<String>,
    resolver: &dyn ReferenceResolver,
) -> Result<Diff> {
    let mut diff = Diff::default();

    for (key, setting) in &defn.settings {
        if reserved.contains(key) {
            continue;
        }
        let recorded = current.get(key);
        let desired = desired_value(defn, setting, resolver)?;

        let kind = match (recorded, &desired) {
            (None, None) => continue,
            (Some(value), Some(Desired::Value(wanted))) if value == wanted => continue,
            (None, Some(_)) => DiffKind::Set,
            (Some(_), Some(_)) => DiffKind::Update,
            (Some(_), None) => DiffKind::Unset,
        };
        diff.push(KeyDiff {
            key: key.clone(),
            kind,
            current: recorded.cloned(),
            desired,
        });
    }

    for (key, value) in current {
        if reserved.contains(key) || defn.settings.contains_key(key) {
            continue;
        }
        diff.push(KeyDiff {
            key: key.clone(),
            kind: DiffKind::Unset,
            current: Some(value.clone()),
            desired: None,
        });
    }

    Ok(diff)
}
