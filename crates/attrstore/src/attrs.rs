//! Key/value access to one attribute scope
//!
//! [`AttrView`] operates on a borrowed connection (usually an open
//! transaction). [`Attrs`] is the owned handle resources keep around; each
//! of its calls runs in its own implicit transaction, and
//! [`Attrs::transaction`] groups several writes into one.

use crate::error::{Error, Result};
use crate::types::{AttrMap, Scope, Value};
use crate::StateStore;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Attribute operations bound to a connection and a scope
pub struct AttrView<'c> {
    conn: &'c Connection,
    scope: &'c Scope,
}

impl<'c> AttrView<'c> {
    pub(crate) fn new(conn: &'c Connection, scope: &'c Scope) -> Self {
        Self { conn, scope }
    }

    /// Look up a key; `None` means the key was never set (or was deleted)
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        let sql = format!(
            "SELECT value FROM {} WHERE {} = ?1 AND name = ?2",
            self.scope.table(),
            self.scope.owner_column()
        );
        let raw: Option<String> = self
            .conn
            .query_row(&sql, params![self.scope.owner(), key], |row| row.get(0))
            .optional()?;

        raw.map(|text| serde_json::from_str(&text))
            .transpose()
            .map_err(Error::from)
    }

    /// Look up a key, falling back to `default` when it is absent
    pub fn get_or(&self, key: &str, default: Value) -> Result<Value> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    /// Look up a key and decode it into `T`
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.get(key)?
            .map(serde_json::from_value)
            .transpose()
            .map_err(Error::from)
    }

    /// Store a value; `Value::Null` deletes the key instead
    pub fn set(&self, key: &str, value: Value) -> Result<()> {
        if value.is_null() {
            return self.delete(key);
        }

        let sql = format!(
            "INSERT OR REPLACE INTO {} ({}, name, value) VALUES (?1, ?2, ?3)",
            self.scope.table(),
            self.scope.owner_column()
        );
        let text = serde_json::to_string(&value)?;
        self.conn
            .execute(&sql, params![self.scope.owner(), key, text])?;
        Ok(())
    }

    /// Encode `value` with serde and store it
    pub fn set_as<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        self.set(key, serde_json::to_value(value)?)
    }

    /// Store several values; null values delete their key
    pub fn set_many<I>(&self, values: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        for (key, value) in values {
            self.set(&key, value)?;
        }
        Ok(())
    }

    /// Remove a key; removing an absent key is not an error
    pub fn delete(&self, key: &str) -> Result<()> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?1 AND name = ?2",
            self.scope.table(),
            self.scope.owner_column()
        );
        self.conn.execute(&sql, params![self.scope.owner(), key])?;
        Ok(())
    }

    /// All keys currently stored for this scope
    pub fn keys(&self) -> Result<BTreeSet<String>> {
        let sql = format!(
            "SELECT name FROM {} WHERE {} = ?1",
            self.scope.table(),
            self.scope.owner_column()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let keys = stmt
            .query_map(params![self.scope.owner()], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<BTreeSet<_>, _>>()?;
        Ok(keys)
    }

    /// Snapshot of every stored attribute
    pub fn export(&self) -> Result<AttrMap> {
        let sql = format!(
            "SELECT name, value FROM {} WHERE {} = ?1",
            self.scope.table(),
            self.scope.owner_column()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![self.scope.owner()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut attrs = AttrMap::new();
        for (key, text) in rows {
            attrs.insert(key, serde_json::from_str(&text)?);
        }
        Ok(attrs)
    }

    /// Replace the whole attribute set with `attrs`
    pub fn import_(&self, attrs: &AttrMap) -> Result<()> {
        self.clear()?;
        self.set_many(attrs.iter().map(|(k, v)| (k.clone(), v.clone())))
    }

    /// Remove every attribute of this scope
    pub fn clear(&self) -> Result<()> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?1",
            self.scope.table(),
            self.scope.owner_column()
        );
        self.conn.execute(&sql, params![self.scope.owner()])?;
        Ok(())
    }
}

/// Owned handle to the attributes of one deployment or resource
#[derive(Clone)]
pub struct Attrs {
    store: Arc<StateStore>,
    scope: Scope,
}

impl std::fmt::Debug for Attrs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attrs").field("scope", &self.scope).finish()
    }
}

impl Attrs {
    pub(crate) fn new(store: Arc<StateStore>, scope: Scope) -> Self {
        Self { store, scope }
    }

    /// The scope this handle reads and writes
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// The store behind this handle
    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        self.store
            .with_conn(|conn| AttrView::new(conn, &self.scope).get(key))
    }

    pub fn get_or(&self, key: &str, default: Value) -> Result<Value> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.store
            .with_conn(|conn| AttrView::new(conn, &self.scope).get_as(key))
    }

    pub fn set(&self, key: &str, value: Value) -> Result<()> {
        self.store
            .with_conn(|conn| AttrView::new(conn, &self.scope).set(key, value))
    }

    pub fn set_as<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        self.set(key, serde_json::to_value(value)?)
    }

    /// Store several values atomically
    pub fn set_many<I>(&self, values: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        self.transaction(|attrs| attrs.set_many(values))
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        self.store
            .with_conn(|conn| AttrView::new(conn, &self.scope).delete(key))
    }

    pub fn keys(&self) -> Result<BTreeSet<String>> {
        self.store
            .with_conn(|conn| AttrView::new(conn, &self.scope).keys())
    }

    pub fn export(&self) -> Result<AttrMap> {
        self.store
            .with_conn(|conn| AttrView::new(conn, &self.scope).export())
    }

    /// Replace the attribute set atomically
    pub fn import_(&self, attrs: &AttrMap) -> Result<()> {
        self.transaction(|view| view.import_(attrs))
    }

    /// Run `f` inside one transaction; any error rolls back all of its writes
    ///
    /// Transactions are not re-entrant: calling back into the store from
    /// inside `f` through another handle deadlocks.
    pub fn transaction<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&AttrView<'_>) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        self.store
            .transaction(|tx| f(&AttrView::new(tx.connection(), &self.scope)))
    }
}
