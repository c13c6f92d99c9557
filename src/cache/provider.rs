//! Cache providers: the key/entry mapping the cache layer stores into.
//!
//! The layer only sees [`CacheProvider`], so it behaves the same whether the
//! entries live in memory only or are mirrored to durable storage.

use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{info, warn};

use super::entry::CacheEntry;
use super::snapshot::{CacheScope, Snapshot};
use super::storage::DurableStorage;
use super::writer::{CoalescingWriter, WriterSettings};

/// Mapping from cache key to entry.
pub trait CacheProvider: Send + Sync {
  fn get(&self, key: &str) -> Option<CacheEntry>;

  fn set(&self, key: &str, entry: CacheEntry);

  fn delete(&self, key: &str);

  fn keys(&self) -> Vec<String>;

  /// Remove every entry, including anything persisted.
  fn clear(&self);

  /// Push pending changes to durable storage, if any.
  fn flush(&self) {}

  /// Flush and release background resources.
  fn close(&self) {}
}

type EntryMap = Arc<Mutex<HashMap<String, CacheEntry>>>;

fn lock_entries(entries: &EntryMap) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
  // Entries stay consistent even if a holder panicked: every write is a single insert/remove
  entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Plain in-memory provider.
///
/// Used where no durable storage exists (server-side rendering, one provider
/// per request) and in tests.
#[derive(Clone, Default)]
pub struct MemoryProvider {
  entries: EntryMap,
}

impl MemoryProvider {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn from_entries(entries: HashMap<String, CacheEntry>) -> Self {
    Self {
      entries: Arc::new(Mutex::new(entries)),
    }
  }

  fn capture(&self) -> Snapshot {
    Snapshot::capture(lock_entries(&self.entries).iter())
  }
}

impl CacheProvider for MemoryProvider {
  fn get(&self, key: &str) -> Option<CacheEntry> {
    lock_entries(&self.entries).get(key).cloned()
  }

  fn set(&self, key: &str, entry: CacheEntry) {
    lock_entries(&self.entries).insert(key.to_string(), entry);
  }

  fn delete(&self, key: &str) {
    lock_entries(&self.entries).remove(key);
  }

  fn keys(&self) -> Vec<String> {
    lock_entries(&self.entries).keys().cloned().collect()
  }

  fn clear(&self) {
    lock_entries(&self.entries).clear();
  }
}

/// Settings for [`PersistentProvider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistSettings {
  pub writer: WriterSettings,
  /// Persisted entries older than this are dropped when hydrating
  pub max_age: Duration,
}

impl Default for PersistSettings {
  fn default() -> Self {
    Self {
      writer: WriterSettings::default(),
      max_age: Duration::from_secs(24 * 60 * 60),
    }
  }
}

/// In-memory provider mirrored to durable storage.
///
/// Memory stays authoritative for the session; storage is written through a
/// coalescing writer and is best-effort only.
pub struct PersistentProvider {
  memory: MemoryProvider,
  storage: Arc<dyn DurableStorage>,
  storage_key: String,
  writer: CoalescingWriter,
}

impl PersistentProvider {
  /// Build a provider from the snapshot stored for `scope`.
  ///
  /// A missing, unreadable or corrupt snapshot yields an empty provider.
  /// Must be called inside a tokio runtime.
  pub fn hydrate(
    storage: Arc<dyn DurableStorage>,
    scope: &CacheScope,
    settings: PersistSettings,
  ) -> Self {
    let storage_key = scope.storage_key();

    let entries = match load_snapshot(storage.as_ref(), &storage_key) {
      Ok(Some(snapshot)) => {
        let entries = snapshot.into_entries(settings.max_age);
        info!(key = %storage_key, entries = entries.len(), "hydrated cache from snapshot");
        entries
      }
      Ok(None) => HashMap::new(),
      Err(e) => {
        warn!(key = %storage_key, error = %e, "ignoring unreadable cache snapshot");
        HashMap::new()
      }
    };

    let memory = MemoryProvider::from_entries(entries);

    let writer = {
      let memory = memory.clone();
      let storage = Arc::clone(&storage);
      let key = storage_key.clone();
      CoalescingWriter::spawn(settings.writer, move || {
        let raw = memory.capture().encode()?;
        storage.set(&key, &raw)
      })
    };

    Self {
      memory,
      storage,
      storage_key,
      writer,
    }
  }

  pub fn storage_key(&self) -> &str {
    &self.storage_key
  }
}

fn load_snapshot(storage: &dyn DurableStorage, key: &str) -> Result<Option<Snapshot>> {
  let raw = storage
    .get(key)
    .map_err(|e| eyre!("Failed to read cache snapshot: {}", e))?;

  raw.map(|raw| Snapshot::decode(&raw)).transpose()
}

impl CacheProvider for PersistentProvider {
  fn get(&self, key: &str) -> Option<CacheEntry> {
    self.memory.get(key)
  }

  fn set(&self, key: &str, entry: CacheEntry) {
    self.memory.set(key, entry);
    self.writer.schedule();
  }

  fn delete(&self, key: &str) {
    self.memory.delete(key);
    self.writer.schedule();
  }

  fn keys(&self) -> Vec<String> {
    self.memory.keys()
  }

  fn clear(&self) {
    // Waits out a write already in progress so it cannot land after the remove
    self.writer.discard_with(|| {
      self.memory.clear();
      if let Err(e) = self.storage.remove(&self.storage_key) {
        warn!(key = %self.storage_key, error = %e, "failed to remove cache snapshot");
      }
    });
  }

  fn flush(&self) {
    self.writer.flush();
  }

  fn close(&self) {
    self.writer.shutdown();
  }
}
