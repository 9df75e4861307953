//! Preference storage for ridguard.
//!
//! A flat key-value namespace backing [`Settings`](crate::settings::Settings).
//! Two backends are provided: [`MemoryPreferences`] for tests and ephemeral
//! sessions, and [`SqlitePreferences`], which persists to `SQLite` and keeps
//! a write-through cache so reads on the ingest and display paths never touch
//! the disk.

pub mod migrations;
pub mod schema;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::types::Value;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// A stored option value.
///
/// The same logical option may have been written as a number or as text;
/// readers decide how to interpret it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrefValue {
    /// Integer representation.
    Int(i64),
    /// Boolean representation.
    Bool(bool),
    /// Text representation.
    Text(String),
}

impl PrefValue {
    fn kind(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Bool(_) => "bool",
            Self::Text(_) => "text",
        }
    }

    fn to_sql_value(&self) -> Value {
        match self {
            Self::Int(v) => Value::Integer(*v),
            Self::Bool(v) => Value::Integer(i64::from(*v)),
            Self::Text(v) => Value::Text(v.clone()),
        }
    }

    fn from_sql(kind: &str, value: Value) -> Option<Self> {
        match (kind, value) {
            ("bool", Value::Integer(v)) => Some(Self::Bool(v != 0)),
            (_, Value::Integer(v)) => Some(Self::Int(v)),
            (_, Value::Text(v)) => Some(Self::Text(v)),
            (_, Value::Real(v)) => Some(Self::Text(v.to_string())),
            (_, Value::Null | Value::Blob(_)) => None,
        }
    }
}

impl std::fmt::Display for PrefValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
        }
    }
}

/// A flat key-value preference store.
pub trait PreferenceBackend: Send + Sync + std::fmt::Debug {
    /// Read a value.
    fn get(&self, key: &str) -> Option<PrefValue>;

    /// Write a value, replacing any previous representation.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be persisted.
    fn set(&self, key: &str, value: PrefValue) -> Result<()>;

    /// Remove a value. Returns `true` if it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal cannot be persisted.
    fn remove(&self, key: &str) -> Result<bool>;

    /// All keys starting with `prefix`, sorted.
    fn keys_with_prefix(&self, prefix: &str) -> Vec<String>;
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn sorted_keys(map: &HashMap<String, PrefValue>, prefix: &str) -> Vec<String> {
    let mut keys: Vec<String> = map
        .keys()
        .filter(|k| k.starts_with(prefix))
        .cloned()
        .collect();
    keys.sort();
    keys
}

/// In-memory preference store.
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    values: Mutex<HashMap<String, PrefValue>>,
}

impl MemoryPreferences {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceBackend for MemoryPreferences {
    fn get(&self, key: &str) -> Option<PrefValue> {
        lock(&self.values).get(key).cloned()
    }

    fn set(&self, key: &str, value: PrefValue) -> Result<()> {
        lock(&self.values).insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        Ok(lock(&self.values).remove(key).is_some())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        sorted_keys(&lock(&self.values), prefix)
    }
}

/// `SQLite`-backed preference store with a write-through cache.
#[derive(Debug)]
pub struct SqlitePreferences {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Mutex<Connection>,
    /// Every stored value, loaded at open.
    cache: Mutex<HashMap<String, PrefValue>>,
}

impl SqlitePreferences {
    /// Open or create a preference database at the given path.
    ///
    /// Creates parent directories if needed, initializes the schema and loads
    /// every stored value into memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening preference store at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::PreferenceOpen {
            path: path.clone(),
            source,
        })?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let store = Self::with_connection(path, conn)?;
        info!(
            "Preference store opened at {} ({} values)",
            store.path.display(),
            lock(&store.cache).len()
        );
        Ok(store)
    }

    /// Create an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::PreferenceOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        Self::with_connection(PathBuf::from(":memory:"), conn)
    }

    fn with_connection(path: PathBuf, conn: Connection) -> Result<Self> {
        migrations::initialize_schema(&conn)?;
        let cache = Self::load_all(&conn)?;
        Ok(Self {
            path,
            conn: Mutex::new(conn),
            cache: Mutex::new(cache),
        })
    }

    fn load_all(conn: &Connection) -> Result<HashMap<String, PrefValue>> {
        let mut stmt = conn.prepare("SELECT key, kind, value FROM preferences")?;
        let rows = stmt
            .query_map([], |row| {
                let key: String = row.get(0)?;
                let kind: String = row.get(1)?;
                let value: Value = row.get(2)?;
                Ok((key, kind, value))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut values = HashMap::with_capacity(rows.len());
        for (key, kind, value) in rows {
            match PrefValue::from_sql(&kind, value) {
                Some(v) => {
                    values.insert(key, v);
                }
                None => warn!(key = %key, "Ignoring preference with unsupported value"),
            }
        }
        Ok(values)
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PreferenceBackend for SqlitePreferences {
    fn get(&self, key: &str) -> Option<PrefValue> {
        lock(&self.cache).get(key).cloned()
    }

    fn set(&self, key: &str, value: PrefValue) -> Result<()> {
        lock(&self.conn).execute(
            r"
            INSERT INTO preferences (key, kind, value, updated_at)
            VALUES (?1, ?2, ?3, datetime('now'))
            ON CONFLICT(key) DO UPDATE SET
                kind = excluded.kind,
                value = excluded.value,
                updated_at = excluded.updated_at
            ",
            params![key, value.kind(), value.to_sql_value()],
        )?;
        debug!(key = %key, "Preference stored");
        lock(&self.cache).insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let affected = lock(&self.conn).execute("DELETE FROM preferences WHERE key = ?1", [key])?;
        lock(&self.cache).remove(key);
        Ok(affected > 0)
    }

    fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        sorted_keys(&lock(&self.cache), prefix)
    }
}
