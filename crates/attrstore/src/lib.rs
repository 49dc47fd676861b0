//! # attrstore
//!
//! Transactional attribute persistence for deployments and their resources.
//!
//! The store is a single SQLite database holding:
//! - deployments, identified by UUID, each with its own attribute set
//! - resource records (stable id, name, type) belonging to a deployment
//! - one row per resource attribute, the value encoded as JSON
//!
//! Writes that describe one logical state transition go through
//! [`StateStore::transaction`] or [`Attrs::transaction`], so a crash leaves
//! either the old or the new attribute set, never a mix.
//!
//! ## Example
//!
//! ```no_run
//! use attrstore::StateStore;
//! use serde_json::json;
//! use std::path::Path;
//!
//! let store = StateStore::open(Path::new("/tmp/state.db"))?;
//! let deployment = store.create_deployment(None)?;
//! let disk = store.declare_resource(&deployment, "data-disk", "disk")?;
//!
//! let attrs = store.attrs(disk.scope());
//! attrs.transaction(|tx| {
//!     tx.set("resourceId", json!("vol-0123"))?;
//!     tx.set("state", json!(3))
//! })?;
//! assert_eq!(attrs.get("resourceId")?, Some(json!("vol-0123")));
//! # Ok::<(), attrstore::Error>(())
//! ```

mod attrs;
mod error;
mod types;

pub use attrs::{AttrView, Attrs};
pub use error::{Error, Result};
pub use types::{
    AttrMap, DeploymentRecord, DeploymentSnapshot, ResourceRecord, ResourceSnapshot, Scope, Value,
};

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS deployments (
        uuid TEXT PRIMARY KEY
    );

    CREATE TABLE IF NOT EXISTS deployment_attrs (
        deployment TEXT NOT NULL REFERENCES deployments(uuid) ON DELETE CASCADE,
        name TEXT NOT NULL,
        value TEXT NOT NULL,
        PRIMARY KEY (deployment, name)
    );

    CREATE TABLE IF NOT EXISTS resources (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        deployment TEXT NOT NULL REFERENCES deployments(uuid) ON DELETE CASCADE,
        name TEXT NOT NULL,
        type TEXT NOT NULL,
        UNIQUE (deployment, name)
    );

    CREATE TABLE IF NOT EXISTS resource_attrs (
        resource INTEGER NOT NULL REFERENCES resources(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        value TEXT NOT NULL,
        PRIMARY KEY (resource, name)
    );

    CREATE INDEX IF NOT EXISTS idx_resources_deployment ON resources(deployment);
";

/// The persisted state of every deployment
///
/// One connection is shared by all threads of the process and guarded by a
/// mutex. Cross-process exclusion is the caller's job (see the store lock in
/// `lockkit`).
pub struct StateStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore").field("path", &self.path).finish()
    }
}

/// An open transaction on the store
pub struct StoreTx<'c> {
    tx: Transaction<'c>,
}

impl<'c> StoreTx<'c> {
    /// The underlying connection, valid until the transaction ends
    pub fn connection(&self) -> &Connection {
        &self.tx
    }

    /// Attribute operations for `scope` inside this transaction
    pub fn attrs<'a>(&'a self, scope: &'a Scope) -> AttrView<'a> {
        AttrView::new(&self.tx, scope)
    }
}

impl StateStore {
    /// Open or create a state file at the given path
    pub fn open(path: &Path) -> Result<Arc<Self>> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| Error::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        log::debug!("Opened state file {}", path.display());

        Ok(Arc::new(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        }))
    }

    /// Open a throwaway in-memory store
    pub fn open_in_memory() -> Result<Arc<Self>> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Arc::new(Self {
            conn: Mutex::new(conn),
            path: None,
        }))
    }

    /// Location of the state file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.lock();
        f(&conn)
    }

    /// Run `f` inside one transaction
    ///
    /// The transaction commits only if `f` returns `Ok`; on error (or panic)
    /// it is rolled back and none of its writes become visible.
    pub fn transaction<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&StoreTx<'_>) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        let mut conn = self.lock();
        let tx = StoreTx {
            tx: conn.transaction().map_err(Error::from)?,
        };
        let out = f(&tx)?;
        tx.tx.commit().map_err(Error::from)?;
        Ok(out)
    }

    /// Owned attribute handle for a deployment or resource
    pub fn attrs(self: &Arc<Self>, scope: Scope) -> Attrs {
        Attrs::new(Arc::clone(self), scope)
    }

    // ========================================================================
    // Deployments
    // ========================================================================

    /// Create a deployment, generating a UUID unless one is given
    pub fn create_deployment(&self, uuid: Option<&str>) -> Result<String> {
        let uuid = uuid.map_or_else(|| uuid::Uuid::new_v4().to_string(), str::to_string);
        self.with_conn(|conn| insert_deployment(conn, &uuid))?;
        log::debug!("Created deployment {uuid}");
        Ok(uuid)
    }

    /// All deployments, ordered by UUID
    pub fn deployments(&self) -> Result<Vec<DeploymentRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT d.uuid,
                        (SELECT value FROM deployment_attrs a
                          WHERE a.deployment = d.uuid AND a.name = 'name'),
                        (SELECT COUNT(*) FROM resources r WHERE r.deployment = d.uuid)
                   FROM deployments d ORDER BY d.uuid",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(uuid, name, count)| {
                    Ok(DeploymentRecord {
                        uuid,
                        name: decode_name(name.as_deref())?,
                        resource_count: usize::try_from(count).unwrap_or_default(),
                    })
                })
                .collect()
        })
    }

    /// Find a deployment by UUID, or by its `name` attribute
    pub fn find_deployment(&self, key: &str) -> Result<DeploymentRecord> {
        let all = self.deployments()?;

        if let Some(found) = all.iter().find(|d| d.uuid == key) {
            return Ok(found.clone());
        }

        let mut by_name = all.into_iter().filter(|d| d.name.as_deref() == Some(key));
        match (by_name.next(), by_name.next()) {
            (Some(found), None) => Ok(found),
            (Some(_), Some(_)) => Err(Error::AmbiguousDeployment(key.to_string())),
            _ => Err(Error::DeploymentNotFound(key.to_string())),
        }
    }

    /// Remove a deployment together with all of its resources and attributes
    pub fn purge_deployment(&self, uuid: &str) -> Result<()> {
        let removed = self.with_conn(|conn| {
            Ok(conn.execute("DELETE FROM deployments WHERE uuid = ?1", params![uuid])?)
        })?;
        if removed == 0 {
            return Err(Error::DeploymentNotFound(uuid.to_string()));
        }
        log::info!("Purged deployment {uuid}");
        Ok(())
    }

    // ========================================================================
    // Resources
    // ========================================================================

    /// Return the record for `name`, creating it if it does not exist yet
    pub fn declare_resource(
        &self,
        deployment: &str,
        name: &str,
        resource_type: &str,
    ) -> Result<ResourceRecord> {
        self.transaction(|tx| {
            let conn = tx.connection();
            if let Some(existing) = select_resource(conn, deployment, name)? {
                if existing.resource_type != resource_type {
                    return Err(Error::TypeMismatch {
                        name: name.to_string(),
                        existing: existing.resource_type,
                        requested: resource_type.to_string(),
                    });
                }
                return Ok(existing);
            }

            ensure_deployment(conn, deployment)?;
            conn.execute(
                "INSERT INTO resources (deployment, name, type) VALUES (?1, ?2, ?3)",
                params![deployment, name, resource_type],
            )?;
            log::debug!("Declared {resource_type} resource '{name}' in {deployment}");

            Ok(ResourceRecord {
                id: conn.last_insert_rowid(),
                deployment: deployment.to_string(),
                name: name.to_string(),
                resource_type: resource_type.to_string(),
            })
        })
    }

    /// All resources of a deployment, in declaration order
    pub fn resources(&self, deployment: &str) -> Result<Vec<ResourceRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, deployment, name, type FROM resources
                  WHERE deployment = ?1 ORDER BY id",
            )?;
            let rows = stmt
                .query_map(params![deployment], row_to_resource)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Look up a resource by name
    pub fn find_resource(&self, deployment: &str, name: &str) -> Result<Option<ResourceRecord>> {
        self.with_conn(|conn| select_resource(conn, deployment, name))
    }

    /// Rename a resource record, keeping its id and attributes
    pub fn rename_resource(&self, deployment: &str, from: &str, to: &str) -> Result<()> {
        self.transaction(|tx| {
            let conn = tx.connection();
            if select_resource(conn, deployment, to)?.is_some() {
                return Err(Error::ResourceExists {
                    deployment: deployment.to_string(),
                    name: to.to_string(),
                });
            }
            let changed = conn.execute(
                "UPDATE resources SET name = ?3 WHERE deployment = ?1 AND name = ?2",
                params![deployment, from, to],
            )?;
            if changed == 0 {
                return Err(Error::ResourceNotFound {
                    deployment: deployment.to_string(),
                    name: from.to_string(),
                });
            }
            Ok(())
        })?;
        log::info!("Renamed resource '{from}' to '{to}' in {deployment}");
        Ok(())
    }

    /// Delete a resource row and all of its attributes
    pub fn purge_resource(&self, id: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM resources WHERE id = ?1", params![id])?;
            Ok(())
        })?;
        log::debug!("Purged resource #{id}");
        Ok(())
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    /// Export a deployment and all of its resources
    pub fn export_deployment(&self, uuid: &str) -> Result<DeploymentSnapshot> {
        self.transaction(|tx| {
            let conn = tx.connection();
            if !deployment_exists(conn, uuid)? {
                return Err(Error::DeploymentNotFound(uuid.to_string()));
            }

            let scope = Scope::Deployment(uuid.to_string());
            let attributes = tx.attrs(&scope).export()?;

            let mut stmt = conn.prepare(
                "SELECT id, deployment, name, type FROM resources
                  WHERE deployment = ?1 ORDER BY id",
            )?;
            let records = stmt
                .query_map(params![uuid], row_to_resource)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut resources = std::collections::BTreeMap::new();
            for record in records {
                let scope = record.scope();
                resources.insert(
                    record.name,
                    ResourceSnapshot {
                        resource_type: record.resource_type,
                        attributes: tx.attrs(&scope).export()?,
                    },
                );
            }

            Ok(DeploymentSnapshot {
                uuid: uuid.to_string(),
                attributes,
                resources,
            })
        })
    }

    /// Recreate a deployment from a snapshot, atomically
    pub fn import_deployment(&self, snapshot: &DeploymentSnapshot) -> Result<String> {
        self.import_deployments(std::slice::from_ref(snapshot))?;
        Ok(snapshot.uuid.clone())
    }

    /// Recreate several deployments in one transaction
    ///
    /// Either every snapshot is imported or none is; an existing UUID or one
    /// repeated in `snapshots` fails the whole batch.
    pub fn import_deployments(&self, snapshots: &[DeploymentSnapshot]) -> Result<Vec<String>> {
        self.transaction(|tx| {
            for snapshot in snapshots {
                import_snapshot(tx, snapshot)?;
            }
            Ok::<_, Error>(())
        })?;

        for snapshot in snapshots {
            log::info!(
                "Imported deployment {} ({} resources)",
                snapshot.uuid,
                snapshot.resources.len()
            );
        }
        Ok(snapshots.iter().map(|s| s.uuid.clone()).collect())
    }
}

fn import_snapshot(tx: &StoreTx<'_>, snapshot: &DeploymentSnapshot) -> Result<()> {
    let conn = tx.connection();
    insert_deployment(conn, &snapshot.uuid)?;

    let scope = Scope::Deployment(snapshot.uuid.clone());
    tx.attrs(&scope).import_(&snapshot.attributes)?;

    for (name, resource) in &snapshot.resources {
        conn.execute(
            "INSERT INTO resources (deployment, name, type) VALUES (?1, ?2, ?3)",
            params![snapshot.uuid, name, resource.resource_type],
        )?;
        let scope = Scope::Resource(conn.last_insert_rowid());
        tx.attrs(&scope).import_(&resource.attributes)?;
    }
    Ok(())
}

fn insert_deployment(conn: &Connection, uuid: &str) -> Result<()> {
    if deployment_exists(conn, uuid)? {
        return Err(Error::DeploymentExists(uuid.to_string()));
    }
    conn.execute("INSERT INTO deployments (uuid) VALUES (?1)", params![uuid])?;
    Ok(())
}

fn deployment_exists(conn: &Connection, uuid: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM deployments WHERE uuid = ?1",
            params![uuid],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn ensure_deployment(conn: &Connection, uuid: &str) -> Result<()> {
    if deployment_exists(conn, uuid)? {
        Ok(())
    } else {
        Err(Error::DeploymentNotFound(uuid.to_string()))
    }
}

fn select_resource(conn: &Connection, deployment: &str, name: &str) -> Result<Option<ResourceRecord>> {
    Ok(conn
        .query_row(
            "SELECT id, deployment, name, type FROM resources
              WHERE deployment = ?1 AND name = ?2",
            params![deployment, name],
            row_to_resource,
        )
        .optional()?)
}

fn row_to_resource(row: &rusqlite::Row<'_>) -> rusqlite::Result<ResourceRecord> {
    Ok(ResourceRecord {
        id: row.get(0)?,
        deployment: row.get(1)?,
        name: row.get(2)?,
        resource_type: row.get(3)?,
    })
}

/// The `name` attribute is stored as JSON; only string names are shown
fn decode_name(raw: Option<&str>) -> Result<Option<String>> {
    match raw {
        None => Ok(None),
        Some(text) => Ok(serde_json::from_str::<Value>(text)?
            .as_str()
            .map(str::to_string)),
    }
}
