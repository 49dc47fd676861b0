//! In-memory provider and a handler-driven volume resource for tests

use crate::context::{ConfirmCallback, NoProgress, Services};
use crate::diff::{ReferenceResolver, Resolution, StoreResolver};
use crate::error::{Error, Result};
use crate::executor::converge;
use crate::handler::HandlerRegistry;
use crate::resource::{HandlerDriven, Identifiable, Resource, Retryable, Taggable};
use crate::state::ResourceState;
use crate::types::{
    AttrMap, CheckReport, ConvergeSummary, CreateOptions, Definition, Drift, HandleOptions,
    LifecycleStatus, Setting, Value,
};
use attrstore::StateStore;
use lockkit::{LockKey, PollConfig, RecordingSleeper, RetryConfig};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const VOLUME_TYPE: &str = "volume";
const DEFAULT_SIZE: i64 = 8;
const OWNED_KEYS: [&str; 4] = ["region", "size", "tags", "attachedTo"];

#[derive(Debug, Clone, PartialEq)]
pub struct FakeVolume {
    pub region: String,
    pub size: i64,
    pub tags: BTreeMap<String, String>,
    pub attached_to: Option<String>,
    pending_polls: u32,
}

/// Provider double: volumes in a map, scripted failures, a call log
#[derive(Debug, Default)]
pub struct FakeCloud {
    volumes: Mutex<BTreeMap<String, FakeVolume>>,
    failures: Mutex<VecDeque<Error>>,
    calls: Mutex<Vec<String>>,
    next_id: AtomicUsize,
    settle_polls: u32,
}

impl FakeCloud {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// New volumes report "not ready" to the first `polls` readiness checks
    pub fn settling(polls: u32) -> Arc<Self> {
        Arc::new(Self {
            settle_polls: polls,
            ..Self::default()
        })
    }

    /// Make the next provider call fail with `error`
    pub fn fail_next(&self, error: Error) {
        self.failures.lock().unwrap().push_back(error);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == op).count()
    }

    /// Current provider view of `id`, without logging a call
    pub fn volume(&self, id: &str) -> Option<FakeVolume> {
        self.volumes.lock().unwrap().get(id).cloned()
    }

    /// Change a volume behind the engine's back
    pub fn tamper(&self, id: &str, f: impl FnOnce(&mut FakeVolume)) {
        if let Some(volume) = self.volumes.lock().unwrap().get_mut(id) {
            f(volume);
        }
    }

    /// Delete a volume behind the engine's back
    pub fn forget(&self, id: &str) {
        self.volumes.lock().unwrap().remove(id);
    }

    fn call(&self, op: &str) -> Result<()> {
        self.calls.lock().unwrap().push(op.to_string());
        match self.failures.lock().unwrap().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn with_volume<T>(&self, id: &str, f: impl FnOnce(&mut FakeVolume) -> T) -> Result<T> {
        let mut volumes = self.volumes.lock().unwrap();
        let volume = volumes
            .get_mut(id)
            .ok_or_else(|| Error::provider(id, "InvalidVolume.NotFound"))?;
        Ok(f(volume))
    }

    pub fn create_volume(
        &self,
        region: &str,
        size: i64,
        tags: &BTreeMap<String, String>,
    ) -> Result<String> {
        self.call("create")?;
        let id = format!("vol-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.volumes.lock().unwrap().insert(
            id.clone(),
            FakeVolume {
                region: region.to_string(),
                size,
                tags: tags.clone(),
                attached_to: None,
                pending_polls: self.settle_polls,
            },
        );
        Ok(id)
    }

    pub fn is_ready(&self, id: &str) -> Result<bool> {
        self.call("describe")?;
        self.with_volume(id, |volume| {
            if volume.pending_polls == 0 {
                true
            } else {
                volume.pending_polls -= 1;
                false
            }
        })
    }

    pub fn describe(&self, id: &str) -> Result<Option<FakeVolume>> {
        self.call("describe")?;
        Ok(self.volume(id))
    }

    pub fn resize(&self, id: &str, size: i64) -> Result<()> {
        self.call("resize")?;
        self.with_volume(id, |volume| volume.size = size)
    }

    pub fn set_tags(&self, id: &str, tags: &BTreeMap<String, String>) -> Result<()> {
        self.call("tag")?;
        self.with_volume(id, |volume| volume.tags = tags.clone())
    }

    pub fn attach(&self, id: &str, target: Option<&str>) -> Result<()> {
        self.call("attach")?;
        self.with_volume(id, |volume| volume.attached_to = target.map(String::from))
    }

    /// Deleting an absent volume succeeds
    pub fn delete_volume(&self, id: &str) -> Result<()> {
        self.call("delete")?;
        self.volumes.lock().unwrap().remove(id);
        Ok(())
    }
}

/// A block volume: created in a region, grown in place, tagged, attached
pub struct Volume {
    state: ResourceState,
    cloud: Arc<FakeCloud>,
    services: Arc<Services>,
    handlers: HandlerRegistry<Self>,
}

impl Volume {
    pub fn new(state: ResourceState, cloud: Arc<FakeCloud>, services: Arc<Services>) -> Result<Self> {
        let handlers = HandlerRegistry::builder()
            .handler("provision", &["region"], &[], Self::provision)
            .handler("resize", &["size"], &["provision"], Self::resize)
            .handler("tag", &["tags"], &["provision"], Self::tag)
            .handler("attach", &["attachedTo"], &["provision"], Self::attach)
            .build()?;
        Ok(Self {
            state,
            cloud,
            services,
            handlers,
        })
    }

    fn require_id(&self) -> Result<String> {
        self.resource_id()?
            .ok_or_else(|| Error::config(self.name(), "volume has not been created"))
    }

    fn provision(&self, defn: &Definition, options: HandleOptions) -> Result<()> {
        let region = defn
            .str("region")
            .ok_or_else(|| Error::config(self.name(), "region is required"))?;

        if let Some(id) = self.resource_id()? {
            let recorded: Option<String> = self.state.attrs().get_as("region")?;
            if recorded.as_deref() == Some(region) {
                return Ok(());
            }
            if !options.allow_recreate {
                return Err(Error::recreate_required(
                    self.name(),
                    format!(
                        "region changed from {} to {}",
                        recorded.as_deref().unwrap_or("nothing"),
                        region
                    ),
                ));
            }
            log::info!("{}: recreating volume {} in {}", self.name(), id, region);
            self.retry("delete volume", || self.cloud.delete_volume(&id))?;
            self.state.mark_destroyed(&OWNED_KEYS)?;
        }

        let size = defn.value("size").and_then(Value::as_i64);
        let tags = self.tags(defn);
        let id = self.retry("create volume", || {
            self.cloud
                .create_volume(region, size.unwrap_or(DEFAULT_SIZE), &tags)
        })?;

        let mut outputs = AttrMap::from([("region".to_string(), Value::from(region))]);
        if let Some(size) = size {
            outputs.insert("size".to_string(), Value::from(size));
        }
        if let Some(user_tags) = defn.value("tags") {
            outputs.insert("tags".to_string(), user_tags.clone());
        }
        self.state.record_created(&id, &outputs)?;

        self.services
            .poll(&format!("volume {id} to become available"), || {
                self.cloud.is_ready(&id)
            })?;
        Ok(())
    }

    fn resize(&self, defn: &Definition, options: HandleOptions) -> Result<()> {
        let id = self.require_id()?;
        let Some(size) = defn.value("size").and_then(Value::as_i64) else {
            self.state.attrs().delete("size")?;
            return Ok(());
        };

        let recorded: Option<i64> = self.state.attrs().get_as("size")?;
        if recorded == Some(size) {
            return Ok(());
        }
        if recorded.is_some_and(|old| size < old) {
            return Err(Error::config(self.name(), "volumes cannot shrink"));
        }
        if self.state.attrs().get("attachedTo")?.is_some() && !options.allow_reboot {
            return Err(Error::reboot_required(
                self.name(),
                "resizing an attached volume restarts its server",
            ));
        }

        self.retry("resize volume", || self.cloud.resize(&id, size))?;
        self.state.attrs().set("size", Value::from(size))?;
        Ok(())
    }

    fn tag(&self, defn: &Definition, _options: HandleOptions) -> Result<()> {
        let id = self.require_id()?;
        let tags = self.tags(defn);
        self.retry("tag volume", || self.cloud.set_tags(&id, &tags))?;
        self.state
            .attrs()
            .set("tags", defn.value("tags").cloned().unwrap_or(Value::Null))?;
        Ok(())
    }

    fn attach(&self, defn: &Definition, _options: HandleOptions) -> Result<()> {
        let id = self.require_id()?;
        let target = match defn.get("attachedTo") {
            None | Some(Setting::Value(Value::Null)) => None,
            Some(Setting::Value(value)) => value.as_str().map(String::from),
            Some(Setting::Reference { target }) => {
                match StoreResolver::for_state(&self.state).resolve(target)? {
                    Resolution::Ready(value) => value.as_str().map(String::from),
                    Resolution::Pending => {
                        return Err(Error::config(
                            self.name(),
                            format!("{target} is not available yet"),
                        ));
                    }
                    Resolution::Unknown => {
                        return Err(Error::DanglingReference {
                            resource: self.name().to_string(),
                            target: target.resource.clone(),
                        });
                    }
                }
            }
        };

        let key = LockKey::new(["attachment", id.as_str()]);
        self.services.exclusive(&key, || {
            self.retry("attach volume", || self.cloud.attach(&id, target.as_deref()))
        })?;
        self.state
            .attrs()
            .set("attachedTo", target.map_or(Value::Null, Value::from))?;
        Ok(())
    }
}

impl Identifiable for Volume {
    fn state(&self) -> &ResourceState {
        &self.state
    }
}

impl Taggable for Volume {}

impl Retryable for Volume {
    fn services(&self) -> &Services {
        &self.services
    }
}

impl Resource for Volume {
    fn get_type(&self) -> &str {
        VOLUME_TYPE
    }

    fn create(&self, defn: &Definition, options: CreateOptions) -> Result<ConvergeSummary> {
        let resolver = StoreResolver::for_state(&self.state);
        converge(self, defn, options, &resolver, &mut NoProgress)
    }

    fn check(&self) -> Result<CheckReport> {
        let Some(id) = self.resource_id()? else {
            return Ok(CheckReport::in_sync(self.status()?));
        };
        let Some(observed) = self.retry("describe volume", || self.cloud.describe(&id))? else {
            log::warn!("{}: volume {} no longer exists", self.name(), id);
            self.state.mark_destroyed(&OWNED_KEYS)?;
            return Ok(CheckReport::in_sync(LifecycleStatus::Missing));
        };

        let mut drift = Vec::new();
        let recorded_size: Option<i64> = self.state.attrs().get_as("size")?;
        if let Some(recorded) = recorded_size
            && recorded != observed.size
        {
            drift.push(Drift {
                key: "size".to_string(),
                recorded: Some(Value::from(recorded)),
                observed: Some(Value::from(observed.size)),
            });
        }
        let recorded_target: Option<String> = self.state.attrs().get_as("attachedTo")?;
        if recorded_target != observed.attached_to {
            drift.push(Drift {
                key: "attachedTo".to_string(),
                recorded: recorded_target.map(Value::from),
                observed: observed.attached_to.clone().map(Value::from),
            });
        }

        self.state.transaction(|view| {
            for entry in &drift {
                view.set(&entry.key, entry.observed.clone().unwrap_or(Value::Null))?;
            }
            Ok(())
        })?;

        Ok(CheckReport {
            status: self.status()?,
            drift,
        })
    }

    fn destroy(&self, wipe: bool, confirm: &mut dyn ConfirmCallback) -> Result<bool> {
        let Some(id) = self.resource_id()? else {
            self.state.mark_destroyed(&OWNED_KEYS)?;
            return Ok(true);
        };
        if wipe && !confirm.confirm(&format!("Erase all data on {} ({})?", self.name(), id))? {
            return Ok(false);
        }

        self.state.set_status(LifecycleStatus::Stopping)?;
        let key = LockKey::new(["attachment", id.as_str()]);
        self.services.exclusive(&key, || {
            self.retry("delete volume", || self.cloud.delete_volume(&id))
        })?;
        self.state.mark_destroyed(&OWNED_KEYS)?;
        Ok(true)
    }
}

impl HandlerDriven for Volume {
    fn handlers(&self) -> &HandlerRegistry<Self> {
        &self.handlers
    }
}

/// A deployment in an in-memory store, a fake provider and services that
/// record sleeps instead of blocking
pub struct Fixture {
    pub store: Arc<StateStore>,
    pub deployment: String,
    pub cloud: Arc<FakeCloud>,
    pub services: Arc<Services>,
    pub sleeper: Arc<RecordingSleeper>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_cloud(FakeCloud::new())
    }

    pub fn with_cloud(cloud: Arc<FakeCloud>) -> Self {
        let store = StateStore::open_in_memory().unwrap();
        let deployment = store.create_deployment(None).unwrap();
        let sleeper = Arc::new(RecordingSleeper::new());
        let services = Services::new(
            RetryConfig::new(3, Duration::from_secs(1), Duration::from_secs(1)),
            PollConfig::new(Duration::from_secs(1), 2.0, 5),
        )
        .with_sleeper(sleeper.clone());
        Self {
            store,
            deployment,
            cloud,
            services: Arc::new(services),
            sleeper,
        }
    }

    pub fn volume(&self, name: &str) -> Volume {
        let state = ResourceState::declare(&self.store, &self.deployment, name, VOLUME_TYPE).unwrap();
        Volume::new(state, Arc::clone(&self.cloud), Arc::clone(&self.services)).unwrap()
    }
}

pub fn volume_defn(name: &str, region: &str, size: i64) -> Definition {
    Definition::new(name, VOLUME_TYPE)
        .with("region", region)
        .with("size", size)
}
