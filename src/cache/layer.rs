//! Cache layer that orchestrates revalidation, deduplication and persistence.

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::entry::{CacheEntry, EntrySnapshot};
use super::error::FetchError;
use super::provider::{CacheProvider, MemoryProvider};
use super::status::{QueryEvent, QueryStatus};
use crate::query::{Query, QueryOptions};

pub(crate) type FetchResult = Result<Value, FetchError>;
pub(crate) type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;
type Fetcher = Arc<dyn Fn() -> BoxFuture<'static, FetchResult> + Send + Sync>;

/// Why a revalidation was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Trigger {
  Mount,
  Focus,
  Reconnect,
  Interval,
  Retry(u32),
  Manual,
}

impl Trigger {
  /// Triggers that respect the deduping interval. The others still join an
  /// in-flight request but ignore how recently the value was fetched.
  fn dedupes(self) -> bool {
    matches!(self, Trigger::Mount | Trigger::Focus | Trigger::Reconnect)
  }

  /// Triggers that start a fresh retry budget.
  fn resets_retries(self) -> bool {
    matches!(self, Trigger::Manual | Trigger::Interval)
  }
}

struct InFlight {
  stamp: u64,
  future: SharedFetch,
}

/// Everything the layer tracks per key besides the entry itself.
struct KeySlot {
  state: watch::Sender<Arc<EntrySnapshot>>,
  status: QueryStatus,
  fetcher: Option<Fetcher>,
  options: QueryOptions,
  subscribers: usize,
  in_flight: Option<InFlight>,
  /// Stamp of the last write applied to the entry; older responses are stale
  applied: u64,
  retry_attempt: u32,
  retry_task: Option<JoinHandle<()>>,
  refresh_task: Option<JoinHandle<()>>,
  last_focus: Option<Instant>,
}

impl KeySlot {
  fn new(entry: &CacheEntry) -> Self {
    let status = QueryStatus::settled(entry.value.is_some(), entry.error.is_some());
    let (state, _) = watch::channel(Arc::new(EntrySnapshot {
      entry: entry.clone(),
      status,
    }));

    Self {
      state,
      status,
      fetcher: None,
      options: QueryOptions::default(),
      subscribers: 0,
      in_flight: None,
      applied: 0,
      retry_attempt: 0,
      retry_task: None,
      refresh_task: None,
      last_focus: None,
    }
  }

  fn publish(&self, entry: &CacheEntry) {
    self.state.send_replace(Arc::new(EntrySnapshot {
      entry: entry.clone(),
      status: self.status,
    }));
  }

  fn cancel_retry(&mut self) {
    if let Some(task) = self.retry_task.take() {
      task.abort();
    }
  }

  fn stop_timers(&mut self) {
    self.cancel_retry();
    if let Some(task) = self.refresh_task.take() {
      task.abort();
    }
  }
}

struct Inner {
  provider: Arc<dyn CacheProvider>,
  slots: Mutex<HashMap<String, KeySlot>>,
  stamps: AtomicU64,
  online: AtomicBool,
}

impl Inner {
  fn slots(&self) -> MutexGuard<'_, HashMap<String, KeySlot>> {
    // No await happens under this lock and slot updates are field writes
    self
      .slots
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  fn next_stamp(&self) -> u64 {
    self.stamps.fetch_add(1, Ordering::SeqCst) + 1
  }

  fn entry(&self, key: &str) -> CacheEntry {
    self.provider.get(key).unwrap_or_default()
  }
}

/// Keyed, revalidating cache shared by every query of a session.
///
/// Cloning is cheap; all clones share the same store. Construct one per
/// session (or per request on the server) and hand it to whatever mounts
/// queries.
#[derive(Clone)]
pub struct CacheLayer {
  inner: Arc<Inner>,
}

impl CacheLayer {
  /// Create a layer over the given provider.
  pub fn new(provider: impl CacheProvider + 'static) -> Self {
    Self {
      inner: Arc::new(Inner {
        provider: Arc::new(provider),
        slots: Mutex::new(HashMap::new()),
        stamps: AtomicU64::new(0),
        online: AtomicBool::new(true),
      }),
    }
  }

  /// A layer without persistence, for server-side use and tests.
  pub fn in_memory() -> Self {
    Self::new(MemoryProvider::new())
  }

  /// Mount a query for `key`.
  ///
  /// Registers `fetcher` as the key's fetcher, starts the background refresh
  /// timer if configured and revalidates unless the cached value is within
  /// the deduping interval. Dropping the returned [`Query`] unmounts it.
  pub fn query<T, F, Fut>(
    &self,
    key: impl Into<String>,
    fetcher: F,
    options: QueryOptions,
  ) -> Query<T>
  where
    T: Serialize + DeserializeOwned + Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
  {
    let key = key.into();
    let fetcher: Fetcher = Arc::new(move || {
      let fut = fetcher();
      async move {
        let data = fut.await?;
        serde_json::to_value(data).map_err(|e| FetchError::decode(e.to_string()))
      }
      .boxed()
    });

    let revalidate_on_mount = options.revalidate_on_mount;
    let receiver = self.subscribe(&key, fetcher, options);
    if revalidate_on_mount {
      self.revalidate(&key, Trigger::Mount);
    }

    Query::new(self.clone(), key, receiver)
  }

  fn subscribe(
    &self,
    key: &str,
    fetcher: Fetcher,
    options: QueryOptions,
  ) -> watch::Receiver<Arc<EntrySnapshot>> {
    let mut slots = self.inner.slots();
    let slot = slots
      .entry(key.to_string())
      .or_insert_with(|| KeySlot::new(&self.inner.entry(key)));

    let interval_changed = slot.options.refresh_interval != options.refresh_interval;
    slot.fetcher = Some(fetcher);
    slot.options = options;
    slot.subscribers += 1;

    if interval_changed {
      if let Some(task) = slot.refresh_task.take() {
        task.abort();
      }
    }
    if slot.refresh_task.is_none() && !slot.options.refresh_interval.is_zero() {
      slot.refresh_task = Some(self.spawn_refresh(key, slot.options.refresh_interval));
    }

    debug!(key, subscribers = slot.subscribers, "query mounted");
    slot.state.subscribe()
  }

  /// Called when a [`Query`] is dropped.
  pub(crate) fn unsubscribe(&self, key: &str) {
    let mut slots = self.inner.slots();
    if let Some(slot) = slots.get_mut(key) {
      slot.subscribers = slot.subscribers.saturating_sub(1);
      if slot.subscribers == 0 {
        // In-flight requests keep running and still update the store
        slot.stop_timers();
        debug!(key, "last consumer unmounted, timers cleared");
      }
    }
  }

  /// Start a request for `key`, or join the one already in flight.
  ///
  /// Returns `None` when nothing was started or joined: no fetcher is
  /// registered, or the trigger dedupes and the value is fresh.
  pub(crate) fn revalidate(&self, key: &str, trigger: Trigger) -> Option<SharedFetch> {
    let mut slots = self.inner.slots();
    let slot = slots.get_mut(key)?;

    if trigger.resets_retries() {
      slot.cancel_retry();
      slot.retry_attempt = 0;
    }

    if let Some(in_flight) = &slot.in_flight {
      debug!(key, ?trigger, "joining in-flight request");
      return Some(in_flight.future.clone());
    }

    let fetcher = slot.fetcher.clone()?;
    let entry = self.inner.entry(key);

    if trigger.dedupes() && entry.is_fresh(slot.options.deduping_interval) {
      debug!(key, ?trigger, "value within deduping interval, skipping");
      return None;
    }

    if let Trigger::Retry(attempt) = trigger {
      // The retry task is the caller; just forget its handle
      slot.retry_task = None;
      debug!(key, attempt, "retrying request");
    }

    let stamp = self.inner.next_stamp();
    let layer = Arc::downgrade(&self.inner);
    let owned_key = key.to_string();
    // The store is updated inside the shared future, so it happens exactly
    // once and before any awaiting caller resumes.
    let future = async move {
      let result = fetcher().await;
      if let Some(inner) = layer.upgrade() {
        CacheLayer { inner }.complete(&owned_key, stamp, result.clone());
      }
      result
    }
    .boxed()
    .shared();

    slot.in_flight = Some(InFlight {
      stamp,
      future: future.clone(),
    });
    slot.status = slot
      .status
      .on(QueryEvent::FetchStart, entry.value.is_some());
    slot.publish(&entry);
    drop(slots);

    debug!(key, stamp, ?trigger, "request started");

    // Drive the request independently of consumers so it completes even if
    // they all unmount; other consumers of the key still benefit.
    tokio::spawn(future.clone());

    Some(future)
  }

  /// Apply the result of the request stamped `stamp`.
  pub(crate) fn complete(&self, key: &str, stamp: u64, result: FetchResult) {
    let mut slots = self.inner.slots();
    let Some(slot) = slots.get_mut(key) else {
      return;
    };

    if slot.in_flight.as_ref().is_some_and(|f| f.stamp == stamp) {
      slot.in_flight = None;
    }

    let mut entry = self.inner.entry(key);

    if stamp <= slot.applied {
      debug!(key, stamp, applied = slot.applied, "discarding superseded response");
      if slot.in_flight.is_none() {
        slot.status = QueryStatus::settled(entry.value.is_some(), entry.error.is_some());
        slot.publish(&entry);
      }
      return;
    }

    let has_value = entry.value.is_some();
    match result {
      Ok(value) => {
        entry.record_success(value);
        slot.applied = stamp;
        slot.retry_attempt = 0;
        slot.status = slot.status.on(QueryEvent::FetchSuccess, has_value);
        debug!(key, stamp, "request succeeded");
      }
      Err(error) => {
        warn!(key, stamp, error = %error, "request failed");
        entry.error = Some(error.clone());
        slot.status = slot.status.on(QueryEvent::FetchFailure, has_value);
        self.schedule_retry(slot, key, &error);
      }
    }

    if slot.in_flight.is_some() {
      // A newer request is already running for this key
      slot.status = slot
        .status
        .on(QueryEvent::FetchStart, entry.value.is_some());
    }

    self.inner.provider.set(key, entry.clone());
    slot.publish(&entry);
  }

  fn schedule_retry(&self, slot: &mut KeySlot, key: &str, error: &FetchError) {
    let options = &slot.options;
    if !options.should_retry_on_error || !error.is_retryable() || slot.subscribers == 0 {
      return;
    }
    if slot.retry_attempt >= options.error_retry_count {
      info!(key, attempts = slot.retry_attempt, "giving up after retries");
      return;
    }

    let delay = retry_delay(options.error_retry_interval, slot.retry_attempt);
    slot.retry_attempt += 1;
    let attempt = slot.retry_attempt;

    let layer = Arc::downgrade(&self.inner);
    let key = key.to_string();
    slot.cancel_retry();
    slot.retry_task = Some(tokio::spawn(async move {
      tokio::time::sleep(delay).await;
      if let Some(inner) = layer.upgrade() {
        CacheLayer { inner }.revalidate(&key, Trigger::Retry(attempt));
      }
    }));
  }

  fn spawn_refresh(&self, key: &str, interval: Duration) -> JoinHandle<()> {
    let layer: Weak<Inner> = Arc::downgrade(&self.inner);
    let key = key.to_string();

    tokio::spawn(async move {
      let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
      loop {
        ticker.tick().await;
        let Some(inner) = layer.upgrade() else {
          break;
        };
        let layer = CacheLayer { inner };
        if !layer.is_online() {
          debug!(key = %key, "offline, skipping scheduled refresh");
          continue;
        }
        layer.revalidate(&key, Trigger::Interval);
      }
    })
  }

  /// Force a request for `key`, bypassing the deduping interval.
  ///
  /// Joins the in-flight request if there is one, so calling this while a
  /// request is running never starts a second one.
  pub fn refetch(&self, key: &str) {
    self.revalidate(key, Trigger::Manual);
  }

  /// Like [`CacheLayer::refetch`] but waits for the outcome.
  #[cfg(test)]
  pub(crate) async fn refetch_now(&self, key: &str) -> Option<FetchResult> {
    let future = self.revalidate(key, Trigger::Manual)?;
    Some(future.await)
  }

  /// The consumer regained foreground attention.
  pub fn focus(&self) {
    let now = Instant::now();
    let keys: Vec<String> = {
      let mut slots = self.inner.slots();
      slots
        .iter_mut()
        .filter(|(_, slot)| slot.subscribers > 0 && slot.options.revalidate_on_focus)
        .filter_map(|(key, slot)| {
          let throttled = slot
            .last_focus
            .is_some_and(|last| now.duration_since(last) < slot.options.focus_throttle_interval);
          if throttled {
            return None;
          }
          slot.last_focus = Some(now);
          slot.status = slot.status.on(QueryEvent::Focus, false);
          Some(key.clone())
        })
        .collect()
    };

    for key in keys {
      self.revalidate(&key, Trigger::Focus);
    }
  }

  /// Record connectivity. Going from offline to online revalidates every
  /// mounted key that asks for it.
  pub fn set_online(&self, online: bool) {
    let was_online = self.inner.online.swap(online, Ordering::SeqCst);
    if was_online == online {
      return;
    }
    info!(online, "connectivity changed");
    if online {
      self.reconnect();
    }
  }

  pub fn is_online(&self) -> bool {
    self.inner.online.load(Ordering::SeqCst)
  }

  fn reconnect(&self) {
    let keys: Vec<String> = {
      let mut slots = self.inner.slots();
      slots
        .iter_mut()
        .filter(|(_, slot)| slot.subscribers > 0 && slot.options.revalidate_on_reconnect)
        .map(|(key, slot)| {
          slot.status = slot.status.on(QueryEvent::Reconnect, false);
          key.clone()
        })
        .collect()
    };

    for key in keys {
      self.revalidate(&key, Trigger::Reconnect);
    }
  }

  /// Current entry for `key`, if any.
  pub fn get(&self, key: &str) -> Option<CacheEntry> {
    self.inner.provider.get(key)
  }

  /// Keys that currently hold an entry.
  pub fn keys(&self) -> Vec<String> {
    self.inner.provider.keys()
  }

  /// Current status for `key`.
  pub fn status(&self, key: &str) -> QueryStatus {
    let slots = self.inner.slots();
    match slots.get(key) {
      Some(slot) => slot.status,
      None => self
        .inner
        .provider
        .get(key)
        .map(|e| QueryStatus::settled(e.value.is_some(), e.error.is_some()))
        .unwrap_or_default(),
    }
  }

  /// Write a value locally, as if it had just been fetched.
  ///
  /// Any request already in flight for the key was issued before this write
  /// and its response will be discarded.
  pub fn mutate(&self, key: &str, value: Value) {
    let stamp = self.inner.next_stamp();
    let mut slots = self.inner.slots();
    let slot = slots
      .entry(key.to_string())
      .or_insert_with(|| KeySlot::new(&self.inner.entry(key)));

    let mut entry = self.inner.entry(key);
    entry.record_success(value);
    slot.applied = stamp;
    slot.status = if slot.in_flight.is_some() {
      QueryStatus::Revalidating
    } else {
      QueryStatus::Ready
    };

    self.inner.provider.set(key, entry.clone());
    slot.publish(&entry);
    debug!(key, stamp, "local mutation applied");
  }

  /// Serialize and [`mutate`](CacheLayer::mutate) a typed value.
  pub fn mutate_with<T: Serialize>(&self, key: &str, value: &T) -> Result<(), FetchError> {
    let value = serde_json::to_value(value).map_err(|e| FetchError::decode(e.to_string()))?;
    self.mutate(key, value);
    Ok(())
  }

  /// Drop the entry for `key`. A response still in flight will not restore it.
  pub fn delete(&self, key: &str) {
    let stamp = self.inner.next_stamp();
    let mut slots = self.inner.slots();
    self.inner.provider.delete(key);

    if let Some(slot) = slots.get_mut(key) {
      slot.applied = stamp;
      slot.status = if slot.in_flight.is_some() {
        QueryStatus::Loading
      } else {
        QueryStatus::Empty
      };
      slot.publish(&CacheEntry::default());
    }
  }

  /// Forget everything cached for the current user, in memory and on disk.
  pub fn sign_out(&self) {
    let stamp = self.inner.next_stamp();
    {
      let mut slots = self.inner.slots();
      for slot in slots.values_mut() {
        slot.applied = stamp;
        slot.cancel_retry();
        slot.retry_attempt = 0;
        slot.status = if slot.in_flight.is_some() {
          QueryStatus::Loading
        } else {
          QueryStatus::Empty
        };
        slot.publish(&CacheEntry::default());
      }
    }
    // Responses stamped before `stamp` are already discarded, so storage I/O
    // can run without the slots lock
    self.inner.provider.clear();
    info!("cache cleared on sign-out");
  }

  /// Stop all timers and flush pending persistence.
  ///
  /// Mounted queries keep their last state but stop refreshing.
  pub fn dispose(&self) {
    {
      let mut slots = self.inner.slots();
      for slot in slots.values_mut() {
        slot.stop_timers();
        slot.fetcher = None;
      }
    }
    self.inner.provider.close();
    info!("cache layer disposed");
  }
}

/// Exponential backoff: `interval * 2^attempt`, capped at 64x.
fn retry_delay(interval: Duration, attempt: u32) -> Duration {
  interval.saturating_mul(1 << attempt.min(6))
}
