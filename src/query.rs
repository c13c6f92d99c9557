//! Revalidating query handle for data fetching with caching support.
//!
//! Inspired by SWR / TanStack Query: a `Query<T>` shows the best known value
//! for a cache key and keeps it fresh. Queries are mounted through
//! [`CacheLayer::query`]; every query for the same key shares one entry and
//! at most one in-flight request.
//!
//! # Example
//!
//! ```ignore
//! let client = portal_client.clone();
//! let mut query = layer.query(
//!   "formation-personnel",
//!   move || {
//!     let client = client.clone();
//!     async move { client.formation_personnel().await }
//!   },
//!   QueryOptions::default(),
//! );
//!
//! // In event loop tick
//! if query.poll() {
//!   // State changed, trigger re-render
//! }
//!
//! // In render
//! let view = query.view();
//! if view.loading {
//!   render_spinner();
//! } else if view.is_empty {
//!   render_empty_state();
//! }
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::cache::{CacheLayer, EntrySnapshot, FetchError, QueryStatus};
use crate::config::CacheConfig;

/// Revalidation policy of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
  /// Mount, focus and reconnect skip the request if the value is younger than this
  pub deduping_interval: Duration,
  /// Background refetch cadence while mounted; zero disables it
  pub refresh_interval: Duration,
  pub revalidate_on_mount: bool,
  pub revalidate_on_focus: bool,
  pub revalidate_on_reconnect: bool,
  /// Focus events closer together than this are ignored
  pub focus_throttle_interval: Duration,
  pub should_retry_on_error: bool,
  /// Retries after a failure before giving up until the next refetch
  pub error_retry_count: u32,
  /// Base delay between retries, doubled on each attempt
  pub error_retry_interval: Duration,
}

impl Default for QueryOptions {
  fn default() -> Self {
    Self {
      deduping_interval: Duration::from_secs(5 * 60),
      refresh_interval: Duration::from_secs(10 * 60),
      revalidate_on_mount: true,
      revalidate_on_focus: true,
      revalidate_on_reconnect: true,
      focus_throttle_interval: Duration::from_secs(5),
      should_retry_on_error: true,
      error_retry_count: 3,
      error_retry_interval: Duration::from_secs(5),
    }
  }
}

impl QueryOptions {
  /// Options using the intervals from the `cache` config section.
  pub fn from_config(config: &CacheConfig) -> Self {
    Self {
      deduping_interval: Duration::from_secs(config.deduping_interval_secs),
      refresh_interval: Duration::from_secs(config.refresh_interval_secs),
      error_retry_count: config.error_retry_count,
      error_retry_interval: Duration::from_secs(config.error_retry_interval_secs),
      ..Self::default()
    }
  }

  pub fn with_deduping_interval(mut self, interval: Duration) -> Self {
    self.deduping_interval = interval;
    self
  }

  pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
    self.refresh_interval = interval;
    self
  }

  pub fn with_revalidate_on_mount(mut self, enabled: bool) -> Self {
    self.revalidate_on_mount = enabled;
    self
  }

  pub fn with_revalidate_on_focus(mut self, enabled: bool) -> Self {
    self.revalidate_on_focus = enabled;
    self
  }

  pub fn with_revalidate_on_reconnect(mut self, enabled: bool) -> Self {
    self.revalidate_on_reconnect = enabled;
    self
  }

  /// Set the retry budget. A count of zero disables retries.
  pub fn with_error_retry(mut self, count: u32, interval: Duration) -> Self {
    self.should_retry_on_error = count > 0;
    self.error_retry_count = count;
    self.error_retry_interval = interval;
    self
  }
}

/// A mounted query for one cache key.
///
/// Query<T> encapsulates:
/// - The decoded value for its key
/// - Loading / validating / error status
/// - Change notifications from the shared cache layer
///
/// Dropping it unmounts the query; once no query for a key is mounted its
/// refresh and retry timers are cleared.
pub struct Query<T> {
  layer: CacheLayer,
  key: String,
  receiver: watch::Receiver<Arc<EntrySnapshot>>,
  snapshot: Arc<EntrySnapshot>,
  data: Option<T>,
  decode_error: Option<FetchError>,
}

impl<T> Query<T>
where
  T: Serialize + DeserializeOwned + Send + 'static,
{
  pub(crate) fn new(
    layer: CacheLayer,
    key: String,
    mut receiver: watch::Receiver<Arc<EntrySnapshot>>,
  ) -> Self {
    let snapshot = receiver.borrow_and_update().clone();
    let mut query = Self {
      layer,
      key,
      receiver,
      snapshot: Arc::default(),
      data: None,
      decode_error: None,
    };
    query.apply(snapshot);
    query
  }

  fn apply(&mut self, snapshot: Arc<EntrySnapshot>) {
    let value_changed = snapshot.entry.value != self.snapshot.entry.value;
    if value_changed {
      match &snapshot.entry.value {
        Some(value) => match serde_json::from_value(value.clone()) {
          Ok(data) => {
            self.data = Some(data);
            self.decode_error = None;
          }
          Err(e) => {
            self.data = None;
            self.decode_error = Some(FetchError::decode(format!(
              "cached value for '{}' has an unexpected shape: {}",
              self.key, e
            )));
          }
        },
        None => {
          self.data = None;
          self.decode_error = None;
        }
      }
    }
    self.snapshot = snapshot;
  }

  fn sync(&mut self) {
    let snapshot = self.receiver.borrow_and_update().clone();
    self.apply(snapshot);
  }

  /// Pull state changes from the cache layer.
  ///
  /// Returns `true` if the state changed. Call this in your event loop tick handler.
  pub fn poll(&mut self) -> bool {
    match self.receiver.has_changed() {
      Ok(true) => {
        self.sync();
        true
      }
      _ => false,
    }
  }

  /// Wait for the next state change.
  pub async fn changed(&mut self) {
    if self.receiver.changed().await.is_ok() {
      self.sync();
    }
  }

  /// Wait until no request is outstanding for this key.
  pub async fn settled(&mut self) {
    while self.is_validating() {
      if self.receiver.changed().await.is_err() {
        return;
      }
      self.sync();
    }
  }

  /// Force a request, bypassing the deduping interval.
  ///
  /// Joins the in-flight request if one is already running.
  pub fn refetch(&mut self) {
    self.layer.refetch(&self.key);
    self.poll();
  }

  /// Write a value locally without a request.
  pub fn mutate(&mut self, value: &T) -> Result<(), FetchError> {
    self.layer.mutate_with(&self.key, value)?;
    self.poll();
    Ok(())
  }

  pub fn key(&self) -> &str {
    &self.key
  }

  /// Last known good value.
  pub fn data(&self) -> Option<&T> {
    self.data.as_ref()
  }

  pub fn status(&self) -> QueryStatus {
    self.snapshot.status
  }

  /// No value yet and the first request is outstanding.
  pub fn is_loading(&self) -> bool {
    self.snapshot.is_loading()
  }

  /// A request is outstanding, even if a stale value is shown.
  pub fn is_validating(&self) -> bool {
    self.snapshot.is_validating()
  }

  /// Last failure, or a decode failure of the cached value.
  pub fn error(&self) -> Option<&FetchError> {
    self
      .decode_error
      .as_ref()
      .or(self.snapshot.entry.error.as_ref())
  }

  /// When the shown value was fetched.
  pub fn fetched_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
    self.snapshot.entry.fetched_at
  }
}

impl<T> Drop for Query<T> {
  fn drop(&mut self) {
    self.layer.unsubscribe(&self.key);
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Query<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Query")
      .field("key", &self.key)
      .field("status", &self.snapshot.status)
      .field("data", &self.data)
      .finish_non_exhaustive()
  }
}
