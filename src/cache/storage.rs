//! Durable key-value storage backends for cache snapshots.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// String-keyed storage that outlives the process.
pub trait DurableStorage: Send + Sync {
  /// Read the value stored under `key`.
  fn get(&self, key: &str) -> Result<Option<String>>;

  /// Store `value` under `key`, replacing any previous value.
  fn set(&self, key: &str, value: &str) -> Result<()>;

  /// Remove `key` if present.
  fn remove(&self, key: &str) -> Result<()>;
}

/// In-process storage with an optional byte quota, mirroring the limits of
/// browser local storage.
#[derive(Default)]
pub struct MemoryStorage {
  items: Mutex<HashMap<String, String>>,
  quota: Option<usize>,
  writes: AtomicUsize,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  /// Reject writes that would grow the stored keys and values past `bytes`.
  pub fn with_quota(bytes: usize) -> Self {
    Self {
      quota: Some(bytes),
      ..Self::default()
    }
  }

  /// Number of successful `set` calls.
  pub fn write_count(&self) -> usize {
    self.writes.load(Ordering::SeqCst)
  }
}

impl DurableStorage for MemoryStorage {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let items = self
      .items
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(items.get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    let mut items = self
      .items
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    if let Some(quota) = self.quota {
      let used: usize = items
        .iter()
        .filter(|(k, _)| k.as_str() != key)
        .map(|(k, v)| k.len() + v.len())
        .sum();
      let needed = used + key.len() + value.len();
      if needed > quota {
        return Err(eyre!(
          "Storage quota exceeded: {} bytes needed, {} allowed",
          needed,
          quota
        ));
      }
    }

    items.insert(key.to_string(), value.to_string());
    self.writes.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    let mut items = self
      .items
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    items.remove(key);
    Ok(())
  }
}

/// SQLite-based storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open the storage at the default location.
  pub fn open_default() -> Result<Self> {
    Self::open(&Self::default_path()?)
  }

  /// Open or create the storage database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("formation-portal").join("cache.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(STORAGE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

const STORAGE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl DurableStorage for SqliteStorage {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .query_row(
        "SELECT value FROM kv_store WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read '{}': {}", key, e))
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO kv_store (key, value, updated_at)
         VALUES (?, ?, datetime('now'))",
        params![key, value],
      )
      .map_err(|e| eyre!("Failed to write '{}': {}", key, e))?;

    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM kv_store WHERE key = ?", params![key])
      .map_err(|e| eyre!("Failed to remove '{}': {}", key, e))?;

    Ok(())
  }
}
