//! Resource lifecycle traits
//!
//! A resource type is a struct that owns its [`ResourceState`] and
//! implements [`Resource`]. Shared behaviour is mixed in by implementing
//! small capability traits:
//!
//! - [`Identifiable`]: access to the persisted identity and status
//! - [`Taggable`]: provider tags derived from the deployment and name
//! - [`Retryable`]: a retry policy for remote calls
//! - [`HandlerDriven`]: a handler registry, which makes the resource usable
//!   with [`converge`](crate::converge)
//!
//! # Example
//!
//! ```ignore
//! use reconcile::{Definition, Resource, CreateOptions, CheckReport};
//!
//! struct Bucket {
//!     state: ResourceState,
//!     handlers: HandlerRegistry<Bucket>,
//! }
//!
//! impl Resource for Bucket {
//!     fn get_type(&self) -> &str {
//!         "bucket"
//!     }
//!
//!     fn create(&self, defn: &Definition, options: CreateOptions) -> reconcile::Result<ConvergeSummary> {
//!         let resolver = StoreResolver::for_state(&self.state);
//!         converge(self, defn, options, &resolver, &mut NoProgress)
//!     }
//!     // check, destroy ...
//! }
//! ```

use crate::context::{ConfirmCallback, Services};
use crate::error::Result;
use crate::handler::HandlerRegistry;
use crate::state::{ResourceState, default_reserved_keys};
use crate::types::{CheckReport, ConvergeSummary, CreateOptions, Definition, LifecycleStatus};
use lockkit::RetryConfig;
use std::collections::{BTreeMap, BTreeSet};

/// Tag carrying the deployment UUID
pub const DEPLOYMENT_TAG: &str = "stratus:deployment";
/// Tag carrying the resource name
pub const RESOURCE_TAG: &str = "stratus:resource";

/// Access to a resource's persisted identity
pub trait Identifiable {
    fn state(&self) -> &ResourceState;

    fn name(&self) -> &str {
        self.state().name()
    }

    fn index(&self) -> Result<Option<i64>> {
        self.state().index()
    }

    /// Provider identifier once created, else `None`
    fn resource_id(&self) -> Result<Option<String>> {
        self.state().resource_id()
    }

    fn status(&self) -> Result<LifecycleStatus> {
        self.state().status()
    }
}

/// Resources whose provider objects carry key/value tags
pub trait Taggable: Identifiable {
    /// Tags requested in the definition's `tags` map; non-string values are
    /// rendered as JSON
    fn user_tags(&self, defn: &Definition) -> BTreeMap<String, String> {
        defn.value("tags")
            .and_then(|tags| tags.as_object())
            .map(|tags| {
                tags.iter()
                    .map(|(k, v)| {
                        let v = v.as_str().map_or_else(|| v.to_string(), String::from);
                        (k.clone(), v)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Tags identifying the owning deployment and resource
    fn common_tags(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (
                DEPLOYMENT_TAG.to_string(),
                self.state().deployment().to_string(),
            ),
            (RESOURCE_TAG.to_string(), self.name().to_string()),
        ])
    }

    /// Common tags overlaid with the user's; user values win
    fn tags(&self, defn: &Definition) -> BTreeMap<String, String> {
        let mut tags = self.common_tags();
        tags.extend(self.user_tags(defn));
        tags
    }
}

/// Resources that wrap remote calls in retries
pub trait Retryable {
    fn services(&self) -> &Services;

    /// Policy for this resource type; the shared policy by default
    fn retry_policy(&self) -> &RetryConfig {
        &self.services().retry
    }

    /// Run `op`, retrying transient and rate-limited failures
    fn retry<T, F>(&self, label: &str, op: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
        Self: Sized,
    {
        self.services().retry(label, self.retry_policy(), op)
    }
}

/// Lifecycle operations every resource type implements
pub trait Resource: Identifiable + Send + Sync {
    fn get_type(&self) -> &str;

    /// Converge the remote object to `defn`
    fn create(&self, defn: &Definition, options: CreateOptions) -> Result<ConvergeSummary>;

    /// Read-only reconciliation against the provider
    ///
    /// Updates persisted attributes to what the provider reports, sets the
    /// status to MISSING when the remote object is gone and reports drift.
    fn check(&self) -> Result<CheckReport>;

    /// Tear the remote object down if it exists
    ///
    /// Resets the status to MISSING and clears the provider identity.
    /// Returns `false` only if a confirmation was declined.
    fn destroy(&self, wipe: bool, confirm: &mut dyn ConfirmCallback) -> Result<bool>;

    /// Names of resources in `all` that must be created before this one
    ///
    /// By default these are the resources `defn` refers to.
    fn create_after(&self, all: &[&dyn Resource], defn: Option<&Definition>) -> BTreeSet<String> {
        let Some(defn) = defn else {
            return BTreeSet::new();
        };
        let refs = defn.references();
        all.iter()
            .map(|r| r.name())
            .filter(|name| *name != self.name() && refs.contains(name))
            .map(String::from)
            .collect()
    }

    /// Names of resources in `all` that must be destroyed before this one
    fn destroy_before(&self, all: &[&dyn Resource]) -> BTreeSet<String> {
        self.create_after(all, None)
    }
}

/// Resources reconciled by a handler registry
pub trait HandlerDriven: Resource + Sized {
    fn handlers(&self) -> &HandlerRegistry<Self>;

    /// Keys excluded from diffing
    fn reserved_keys(&self) -> BTreeSet<String> {
        default_reserved_keys()
    }
}
