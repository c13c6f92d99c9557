//! Serialized projection of the cache written to durable storage.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use super::entry::CacheEntry;

/// Bumped whenever the snapshot layout changes; older snapshots are ignored.
pub const SNAPSHOT_VERSION: u32 = 1;

const STORAGE_KEY_PREFIX: &str = "formation-portal:v1";

/// Whose data a cache holds.
///
/// Cached portal data is user-scoped: each user gets their own snapshot so
/// one account never hydrates another account's results.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CacheScope {
  /// Data visible without signing in
  #[default]
  Public,
  /// Data fetched on behalf of a signed-in user
  User(String),
}

impl CacheScope {
  pub fn user(id: impl Into<String>) -> Self {
    CacheScope::User(id.into())
  }

  /// Durable storage key for this scope's snapshot.
  ///
  /// User ids are hashed so they don't end up in plain text on disk.
  pub fn storage_key(&self) -> String {
    match self {
      CacheScope::Public => format!("{}:public", STORAGE_KEY_PREFIX),
      CacheScope::User(id) => {
        let mut hasher = Sha256::new();
        hasher.update(id.as_bytes());
        let digest = hex::encode(hasher.finalize());
        format!("{}:user:{}", STORAGE_KEY_PREFIX, &digest[..16])
      }
    }
  }
}

/// A persisted cache value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedEntry {
  pub value: Value,
  pub fetched_at: DateTime<Utc>,
}

/// Persisted form of the whole cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
  pub version: u32,
  pub entries: BTreeMap<String, PersistedEntry>,
}

impl Snapshot {
  /// Capture the entries that hold a value. Errors are never persisted.
  pub fn capture<'a>(entries: impl IntoIterator<Item = (&'a String, &'a CacheEntry)>) -> Self {
    let entries = entries
      .into_iter()
      .filter_map(|(key, entry)| match (&entry.value, entry.fetched_at) {
        (Some(value), Some(fetched_at)) => Some((
          key.clone(),
          PersistedEntry {
            value: value.clone(),
            fetched_at,
          },
        )),
        _ => None,
      })
      .collect();

    Self {
      version: SNAPSHOT_VERSION,
      entries,
    }
  }

  pub fn encode(&self) -> Result<String> {
    serde_json::to_string(self).map_err(|e| eyre!("Failed to serialize cache snapshot: {}", e))
  }

  pub fn decode(raw: &str) -> Result<Self> {
    let snapshot: Snapshot =
      serde_json::from_str(raw).map_err(|e| eyre!("Failed to parse cache snapshot: {}", e))?;

    if snapshot.version != SNAPSHOT_VERSION {
      return Err(eyre!(
        "Unsupported cache snapshot version {} (expected {})",
        snapshot.version,
        SNAPSHOT_VERSION
      ));
    }

    Ok(snapshot)
  }

  /// Turn the snapshot into cache entries, dropping those older than `max_age`.
  pub fn into_entries(self, max_age: Duration) -> HashMap<String, CacheEntry> {
    let now = Utc::now();
    self
      .entries
      .into_iter()
      .filter(|(_, persisted)| {
        (now - persisted.fetched_at)
          .to_std()
          .map(|age| age <= max_age)
          .unwrap_or(true)
      })
      .map(|(key, persisted)| {
        (
          key,
          CacheEntry::with_value(persisted.value, persisted.fetched_at),
        )
      })
      .collect()
  }
}
