//! Record and snapshot types for the attribute store

use rusqlite::types::Value as SqlValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attribute values are stored as JSON
pub type Value = serde_json::Value;

/// A full attribute set, ordered by key
pub type AttrMap = BTreeMap<String, Value>;

/// Owner of an attribute set
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Deployment-level attributes, keyed by deployment UUID
    Deployment(String),
    /// Resource-level attributes, keyed by the resource row id
    Resource(i64),
}

impl Scope {
    pub(crate) fn table(&self) -> &'static str {
        match self {
            Self::Deployment(_) => "deployment_attrs",
            Self::Resource(_) => "resource_attrs",
        }
    }

    pub(crate) fn owner_column(&self) -> &'static str {
        match self {
            Self::Deployment(_) => "deployment",
            Self::Resource(_) => "resource",
        }
    }

    pub(crate) fn owner(&self) -> SqlValue {
        match self {
            Self::Deployment(uuid) => SqlValue::Text(uuid.clone()),
            Self::Resource(id) => SqlValue::Integer(*id),
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deployment(uuid) => write!(f, "deployment {uuid}"),
            Self::Resource(id) => write!(f, "resource #{id}"),
        }
    }
}

/// A deployment row plus the attributes commonly shown to users
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRecord {
    pub uuid: String,
    /// Value of the `name` deployment attribute, if set
    pub name: Option<String>,
    pub resource_count: usize,
}

/// A resource row: stable identity, human name and type tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    pub id: i64,
    pub deployment: String,
    pub name: String,
    pub resource_type: String,
}

impl ResourceRecord {
    /// Attribute scope of this resource
    pub fn scope(&self) -> Scope {
        Scope::Resource(self.id)
    }
}

/// Exported state of a single resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub attributes: AttrMap,
}

/// Exported state of a deployment and all of its resources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentSnapshot {
    pub uuid: String,
    #[serde(default)]
    pub attributes: AttrMap,
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceSnapshot>,
}
