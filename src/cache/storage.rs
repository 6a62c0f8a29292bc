//! Local store trait and its SQLite, in-memory and no-op implementations.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::traits::{CacheEntry, Payload};
use crate::error::StorageError;

/// Key-value persistence with versioning.
///
/// Calls must not incur network latency; the resolver treats them as
/// synchronous.
pub trait LocalStore: Send + Sync {
  /// Get the entry stored under `key`.
  fn get(&self, key: &str) -> Result<Option<CacheEntry>, StorageError>;

  /// Replace the value and version stored under `key`.
  fn set(&self, key: &str, value: &Payload, version: u64) -> Result<(), StorageError>;

  /// Remove `key`. Removing a missing key is not an error.
  fn delete(&self, key: &str) -> Result<(), StorageError>;
}

impl<S: LocalStore + ?Sized> LocalStore for Arc<S> {
  fn get(&self, key: &str) -> Result<Option<CacheEntry>, StorageError> {
    (**self).get(key)
  }

  fn set(&self, key: &str, value: &Payload, version: u64) -> Result<(), StorageError> {
    (**self).set(key, value, version)
  }

  fn delete(&self, key: &str) -> Result<(), StorageError> {
    (**self).delete(key)
  }
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStore;

impl LocalStore for NoopStore {
  fn get(&self, _key: &str) -> Result<Option<CacheEntry>, StorageError> {
    Ok(None) // Always miss
  }

  fn set(&self, _key: &str, _value: &Payload, _version: u64) -> Result<(), StorageError> {
    Ok(()) // Discard
  }

  fn delete(&self, _key: &str) -> Result<(), StorageError> {
    Ok(())
  }
}

/// Process-local store backed by a hash map.
#[derive(Default)]
pub struct MemoryStore {
  entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.entries.lock().map(|e| e.len()).unwrap_or(0)
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl LocalStore for MemoryStore {
  fn get(&self, key: &str) -> Result<Option<CacheEntry>, StorageError> {
    let entries = self
      .entries
      .lock()
      .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;
    Ok(entries.get(key).cloned())
  }

  fn set(&self, key: &str, value: &Payload, version: u64) -> Result<(), StorageError> {
    let mut entries = self
      .entries
      .lock()
      .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;
    entries.insert(
      key.to_string(),
      CacheEntry {
        key: key.to_string(),
        value: value.clone(),
        version,
        fetched_at: Utc::now(),
      },
    );
    Ok(())
  }

  fn delete(&self, key: &str) -> Result<(), StorageError> {
    let mut entries = self
      .entries
      .lock()
      .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;
    entries.remove(key);
    Ok(())
  }
}

/// SQLite-based store implementation.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open the store at the default location.
  pub fn open() -> Result<Self, StorageError> {
    let path = Self::default_path()?;
    Self::open_at(&path)
  }

  /// Open (or create) the store at `path`.
  pub fn open_at(path: &Path) -> Result<Self, StorageError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| {
        StorageError::Backend(format!("Failed to create cache directory: {}", e))
      })?;
    }

    let conn = Connection::open(path).map_err(|e| {
      StorageError::Backend(format!(
        "Failed to open cache database at {}: {}",
        path.display(),
        e
      ))
    })?;

    Self::from_connection(conn)
  }

  /// Open a private in-memory database.
  pub fn open_in_memory() -> Result<Self, StorageError> {
    Self::from_connection(Connection::open_in_memory()?)
  }

  fn from_connection(conn: Connection) -> Result<Self, StorageError> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf, StorageError> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| StorageError::Backend("Could not determine data directory".into()))?;

    Ok(data_dir.join("cachewise").join("cache.db"))
  }

  fn run_migrations(&self) -> Result<(), StorageError> {
    let conn = self.lock()?;
    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| StorageError::Backend(format!("Failed to run cache migrations: {}", e)))?;
    Ok(())
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StorageError> {
    self
      .conn
      .lock()
      .map_err(|e| StorageError::LockPoisoned(e.to_string()))
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cache_entries (
    key_hash TEXT PRIMARY KEY,
    cache_key TEXT NOT NULL,
    data BLOB NOT NULL,
    version INTEGER NOT NULL,
    fetched_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl LocalStore for SqliteStore {
  fn get(&self, key: &str) -> Result<Option<CacheEntry>, StorageError> {
    let conn = self.lock()?;

    let row: Option<(Vec<u8>, i64, String)> = conn
      .query_row(
        "SELECT data, version, fetched_at FROM cache_entries WHERE key_hash = ?",
        params![key_hash(key)],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
      )
      .optional()?;

    match row {
      Some((data, version, fetched_at)) => Ok(Some(CacheEntry {
        key: key.to_string(),
        value: serde_json::from_slice(&data)?,
        version: u64::try_from(version)
          .map_err(|_| StorageError::Backend(format!("Negative version stored for {}", key)))?,
        fetched_at: parse_datetime(&fetched_at)?,
      })),
      None => Ok(None),
    }
  }

  fn set(&self, key: &str, value: &Payload, version: u64) -> Result<(), StorageError> {
    let data = serde_json::to_vec(value)?;
    let version = i64::try_from(version)
      .map_err(|_| StorageError::Backend(format!("Version {} out of range", version)))?;

    let conn = self.lock()?;
    conn.execute(
      "INSERT OR REPLACE INTO cache_entries (key_hash, cache_key, data, version, fetched_at)
       VALUES (?, ?, ?, ?, datetime('now'))",
      params![key_hash(key), key, data, version],
    )?;

    Ok(())
  }

  fn delete(&self, key: &str) -> Result<(), StorageError> {
    let conn = self.lock()?;
    conn.execute(
      "DELETE FROM cache_entries WHERE key_hash = ?",
      params![key_hash(key)],
    )?;
    Ok(())
  }
}

/// SHA256 hash for stable, fixed-length storage keys.
fn key_hash(key: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(key.as_bytes());
  hex::encode(hasher.finalize())
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StorageError> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| StorageError::Backend(format!("Failed to parse datetime '{}': {}", s, e)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use tempfile::TempDir;

  #[test]
  fn sqlite_set_replaces_value_and_version() {
    let store = SqliteStore::open_in_memory().unwrap();
    assert!(store.get("users/1").unwrap().is_none());

    store.set("users/1", &json!({"name": "ada"}), 1).unwrap();
    store.set("users/1", &json!({"name": "grace"}), 2).unwrap();

    let entry = store.get("users/1").unwrap().unwrap();
    assert_eq!(entry.key, "users/1");
    assert_eq!(entry.value, json!({"name": "grace"}));
    assert_eq!(entry.version, 2);
  }

  #[test]
  fn sqlite_delete_is_idempotent() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.set("k", &json!([1, 2, 3]), 1).unwrap();
    store.delete("k").unwrap();
    store.delete("k").unwrap();
    assert!(store.get("k").unwrap().is_none());
  }

  #[test]
  fn sqlite_persists_across_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("cache.db");

    {
      let store = SqliteStore::open_at(&path).unwrap();
      store.set("settings", &json!({"theme": "dark"}), 4).unwrap();
    }

    let store = SqliteStore::open_at(&path).unwrap();
    let entry = store.get("settings").unwrap().unwrap();
    assert_eq!(entry.version, 4);
    assert_eq!(entry.value["theme"], "dark");
  }

  #[test]
  fn sqlite_rejects_versions_beyond_i64() {
    let store = SqliteStore::open_in_memory().unwrap();
    let err = store.set("k", &json!(null), u64::MAX).unwrap_err();
    assert!(matches!(err, StorageError::Backend(_)));
  }

  #[test]
  fn memory_store_roundtrip() {
    let store = MemoryStore::new();
    store.set("a", &json!("x"), 7).unwrap();
    assert_eq!(store.len(), 1);
    assert_eq!(store.get("a").unwrap().unwrap().version, 7);
    store.delete("a").unwrap();
    assert!(store.is_empty());
  }

  #[test]
  fn noop_store_always_misses() {
    let store = NoopStore;
    store.set("a", &json!(1), 1).unwrap();
    assert!(store.get("a").unwrap().is_none());
  }

  #[test]
  fn key_hash_is_fixed_length() {
    assert_eq!(key_hash("").len(), 64);
    assert_eq!(key_hash("a/very/long/key?with=query").len(), 64);
    assert_ne!(key_hash("a"), key_hash("b"));
  }
}
