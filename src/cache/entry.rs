use chrono::{DateTime, Utc};
use serde_json::Value;
use std::time::Duration;

use super::error::FetchError;
use super::status::QueryStatus;

/// A cached query result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheEntry {
  /// Last successfully fetched payload
  pub value: Option<Value>,
  /// When `value` was fetched
  pub fetched_at: Option<DateTime<Utc>>,
  /// Last fetch failure, cleared by the next success
  pub error: Option<FetchError>,
}

impl CacheEntry {
  pub fn with_value(value: Value, fetched_at: DateTime<Utc>) -> Self {
    Self {
      value: Some(value),
      fetched_at: Some(fetched_at),
      error: None,
    }
  }

  /// Whether the value was fetched less than `interval` ago.
  ///
  /// A timestamp in the future (clock skew) counts as fresh.
  pub fn is_fresh(&self, interval: Duration) -> bool {
    match self.fetched_at {
      Some(fetched_at) => (Utc::now() - fetched_at)
        .to_std()
        .map(|age| age < interval)
        .unwrap_or(true),
      None => false,
    }
  }

  /// Record a successful fetch, never moving `fetched_at` backwards.
  pub(crate) fn record_success(&mut self, value: Value) {
    let now = Utc::now();
    self.fetched_at = Some(self.fetched_at.map_or(now, |prev| prev.max(now)));
    self.value = Some(value);
    self.error = None;
  }
}

/// What subscribers of a key observe: the entry plus its status.
#[derive(Debug, Clone, Default)]
pub struct EntrySnapshot {
  pub entry: CacheEntry,
  pub status: QueryStatus,
}

impl EntrySnapshot {
  pub fn is_loading(&self) -> bool {
    self.status.is_loading()
  }

  pub fn is_validating(&self) -> bool {
    self.status.is_validating()
  }
}
