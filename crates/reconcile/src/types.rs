//! Core types for reconciliation

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

pub use attrstore::{AttrMap, Value};

/// Lifecycle status of a resource
///
/// Persisted as its ordinal; only equality between statuses is meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LifecycleStatus {
    /// Status could not be determined, e.g. after an unresolved rename
    Unknown,
    /// Resource does not exist remotely (initial state)
    #[default]
    Missing,
    /// Creation or restart in progress
    Starting,
    /// Fully reconciled
    Up,
    /// Shutdown in progress
    Stopping,
    /// Exists but is stopped
    Stopped,
    /// Exists but cannot be reached
    Unreachable,
    /// Booted into a recovery environment
    Rescue,
}

impl LifecycleStatus {
    const ALL: [Self; 8] = [
        Self::Unknown,
        Self::Missing,
        Self::Starting,
        Self::Up,
        Self::Stopping,
        Self::Stopped,
        Self::Unreachable,
        Self::Rescue,
    ];

    /// Ordinal used in the state store
    pub fn ordinal(self) -> i64 {
        match self {
            Self::Unknown => 0,
            Self::Missing => 1,
            Self::Starting => 2,
            Self::Up => 3,
            Self::Stopping => 4,
            Self::Stopped => 5,
            Self::Unreachable => 6,
            Self::Rescue => 7,
        }
    }

    /// Inverse of [`ordinal`](Self::ordinal)
    pub fn from_ordinal(ordinal: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.ordinal() == ordinal)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Missing => "missing",
            Self::Starting => "starting",
            Self::Up => "up",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Unreachable => "unreachable",
            Self::Rescue => "rescue",
        }
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pointer at an output attribute of another resource in the same deployment
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceRef {
    pub resource: String,
    #[serde(rename = "attr")]
    pub attribute: String,
}

impl ResourceRef {
    pub fn new(resource: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            attribute: attribute.into(),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource, self.attribute)
    }
}

/// One configuration value of a [`Definition`]
///
/// In JSON a reference is written `{"$ref": {"resource": "vpc", "attr": "resourceId"}}`;
/// anything else is a literal value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Setting {
    Reference {
        #[serde(rename = "$ref")]
        target: ResourceRef,
    },
    Value(Value),
}

impl From<Value> for Setting {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<ResourceRef> for Setting {
    fn from(target: ResourceRef) -> Self {
        Self::Reference { target }
    }
}

/// Immutable desired configuration of one resource instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub settings: BTreeMap<String, Setting>,
}

impl Definition {
    /// Create an empty definition
    pub fn new(name: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource_type: resource_type.into(),
            settings: BTreeMap::new(),
        }
    }

    /// Add a literal setting
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.settings
            .insert(key.into(), Setting::Value(value.into()));
        self
    }

    /// Add a setting that refers to another resource's output
    pub fn with_ref(
        mut self,
        key: impl Into<String>,
        resource: impl Into<String>,
        attribute: impl Into<String>,
    ) -> Self {
        self.settings
            .insert(key.into(), ResourceRef::new(resource, attribute).into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Setting> {
        self.settings.get(key)
    }

    /// Literal value of `key`; `None` for absent keys and references
    pub fn value(&self, key: &str) -> Option<&Value> {
        match self.settings.get(key) {
            Some(Setting::Value(value)) => Some(value),
            _ => None,
        }
    }

    /// Literal string value of `key`
    pub fn str(&self, key: &str) -> Option<&str> {
        self.value(key).and_then(Value::as_str)
    }

    /// Names of every resource this definition refers to
    pub fn references(&self) -> BTreeSet<&str> {
        self.settings
            .values()
            .filter_map(|setting| match setting {
                Setting::Reference { target } => Some(target.resource.as_str()),
                Setting::Value(_) => None,
            })
            .collect()
    }
}

/// Control inputs of [`Resource::create`](crate::Resource::create)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreateOptions {
    /// Reconcile recorded state against the provider before applying changes
    pub check: bool,
    /// Permit operations that reboot the resource
    pub allow_reboot: bool,
    /// Permit destroying and recreating the resource
    pub allow_recreate: bool,
}

/// Consent passed to each handler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandleOptions {
    pub allow_recreate: bool,
    pub allow_reboot: bool,
}

impl From<CreateOptions> for HandleOptions {
    fn from(options: CreateOptions) -> Self {
        Self {
            allow_recreate: options.allow_recreate,
            allow_reboot: options.allow_reboot,
        }
    }
}

/// A recorded attribute that no longer matches the provider
#[derive(Debug, Clone, PartialEq)]
pub struct Drift {
    pub key: String,
    pub recorded: Option<Value>,
    pub observed: Option<Value>,
}

/// Outcome of [`Resource::check`](crate::Resource::check)
#[derive(Debug, Clone, PartialEq)]
pub struct CheckReport {
    /// Status after the check
    pub status: LifecycleStatus,
    /// Attributes that changed outside of this system
    pub drift: Vec<Drift>,
}

impl CheckReport {
    /// A report without drift
    pub fn in_sync(status: LifecycleStatus) -> Self {
        Self {
            status,
            drift: Vec::new(),
        }
    }

    pub fn has_drift(&self) -> bool {
        !self.drift.is_empty()
    }
}

/// Result of converging one resource
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvergeSummary {
    /// Handlers that ran, in order
    pub handlers: Vec<String>,
    /// Keys that differed from the recorded state
    pub changed_keys: Vec<String>,
}

impl ConvergeSummary {
    /// Whether nothing needed to change
    pub fn is_noop(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_ordinals_round_trip() {
        for status in LifecycleStatus::ALL {
            assert_eq!(LifecycleStatus::from_ordinal(status.ordinal()), Some(status));
        }
        assert_eq!(LifecycleStatus::from_ordinal(8), None);
        assert_eq!(LifecycleStatus::Up.ordinal(), 3);
        assert_eq!(LifecycleStatus::default(), LifecycleStatus::Missing);
    }

    #[test]
    fn test_definition_from_json() {
        let defn: Definition = serde_json::from_value(json!({
            "name": "web",
            "type": "vm",
            "settings": {
                "size": "large",
                "subnet": {"$ref": {"resource": "net", "attr": "resourceId"}},
                "labels": {"team": "infra"}
            }
        }))
        .unwrap();

        assert_eq!(defn.str("size"), Some("large"));
        assert_eq!(
            defn.get("subnet"),
            Some(&Setting::Reference {
                target: ResourceRef::new("net", "resourceId")
            })
        );
        assert_eq!(defn.value("labels"), Some(&json!({"team": "infra"})));
        assert_eq!(defn.references().into_iter().collect::<Vec<_>>(), vec!["net"]);
    }

    #[test]
    fn test_definition_builder() {
        let defn = Definition::new("db", "vm")
            .with("size", "small")
            .with_ref("disk", "data", "resourceId");

        assert_eq!(defn.settings.len(), 2);
        assert_eq!(defn.value("disk"), None);
        assert!(defn.references().contains("data"));
    }
}
