//! End-to-end behavior of the cache layer over persisted storage.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use formation_portal::cache::{
  CacheLayer, CacheScope, DurableStorage, FetchError, MemoryStorage, PersistSettings,
  PersistedEntry, PersistentProvider, QueryStatus, Snapshot, SNAPSHOT_VERSION,
};
use formation_portal::query::{Query, QueryOptions};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const KEY: &str = "formation-personnel";

fn seed(storage: &MemoryStorage, scope: &CacheScope, names: &[&str], fetched_at: DateTime<Utc>) {
  let mut entries = BTreeMap::new();
  entries.insert(
    KEY.to_string(),
    PersistedEntry {
      value: json!(names),
      fetched_at,
    },
  );
  let raw = Snapshot {
    version: SNAPSHOT_VERSION,
    entries,
  }
  .encode()
  .unwrap();
  storage.set(&scope.storage_key(), &raw).unwrap();
}

fn layer_over(storage: &Arc<MemoryStorage>, scope: &CacheScope) -> CacheLayer {
  let provider = PersistentProvider::hydrate(storage.clone(), scope, PersistSettings::default());
  CacheLayer::new(provider)
}

/// Mount `KEY` with a fetcher that counts calls and answers `names` after 100ms.
fn mount(
  layer: &CacheLayer,
  names: &'static [&'static str],
  options: QueryOptions,
) -> (Query<Vec<String>>, Arc<AtomicUsize>) {
  let calls = Arc::new(AtomicUsize::new(0));
  let counter = Arc::clone(&calls);
  let query = layer.query(
    KEY,
    move || {
      counter.fetch_add(1, Ordering::SeqCst);
      async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(names.iter().map(|n| n.to_string()).collect())
      }
    },
    options,
  );
  (query, calls)
}

#[tokio::test(start_paused = true)]
async fn test_warm_start_skips_loading_and_request() {
  let storage = Arc::new(MemoryStorage::new());
  let scope = CacheScope::user("alice@example.org");
  seed(&storage, &scope, &["Anne Bernard"], Utc::now());

  let layer = layer_over(&storage, &scope);
  let (mut query, calls) = mount(&layer, &["Paul Roux"], QueryOptions::default());

  let view = query.view();
  assert!(!view.loading);
  assert!(!view.is_refreshing);
  assert_eq!(view.data, Some(&vec!["Anne Bernard".to_string()]));
  assert_eq!(query.status(), QueryStatus::Ready);

  tokio::time::sleep(Duration::from_secs(1)).await;
  query.poll();
  assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stale_value_shown_while_refreshing() {
  let storage = Arc::new(MemoryStorage::new());
  let scope = CacheScope::Public;
  seed(
    &storage,
    &scope,
    &["Anne Bernard"],
    Utc::now() - ChronoDuration::minutes(10),
  );

  let layer = layer_over(&storage, &scope);
  let (mut query, calls) = mount(&layer, &["Anne Bernard", "Paul Roux"], QueryOptions::default());

  let view = query.view();
  assert!(view.is_refreshing);
  assert!(!view.loading);
  assert_eq!(view.data.map(Vec::len), Some(1));

  query.settled().await;

  assert_eq!(calls.load(Ordering::SeqCst), 1);
  assert_eq!(query.data().map(Vec::len), Some(2));
  assert!(!query.view().is_refreshing);
}

#[tokio::test(start_paused = true)]
async fn test_cold_start_then_persisted_round_trip() {
  let storage = Arc::new(MemoryStorage::new());
  let scope = CacheScope::user("alice@example.org");

  {
    let layer = layer_over(&storage, &scope);
    let (mut query, calls) = mount(&layer, &["Anne Bernard"], QueryOptions::default());
    assert!(query.view().loading);

    query.settled().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    layer.dispose();
  }

  // Next session for the same user starts warm
  let layer = layer_over(&storage, &scope);
  let (query, calls) = mount(&layer, &["Someone Else"], QueryOptions::default());
  assert_eq!(query.data(), Some(&vec!["Anne Bernard".to_string()]));
  assert_eq!(calls.load(Ordering::SeqCst), 0);

  // Another user does not see it
  let other = layer_over(&storage, &CacheScope::user("bob@example.org"));
  assert!(other.get(KEY).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_storage_failure_keeps_session_working() {
  let storage = Arc::new(MemoryStorage::with_quota(16));
  let layer = layer_over(&storage, &CacheScope::Public);

  let (mut query, _calls) = mount(&layer, &["Anne Bernard"], QueryOptions::default());
  query.settled().await;

  // Past the debounce window the write has been attempted and rejected
  tokio::time::sleep(Duration::from_secs(2)).await;
  assert_eq!(storage.write_count(), 0);

  assert_eq!(query.data().map(Vec::len), Some(1));
  assert!(query.error().is_none());
  assert!(layer.get(KEY).and_then(|e| e.value).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_failure_keeps_stale_data() {
  let storage = Arc::new(MemoryStorage::new());
  let scope = CacheScope::Public;
  seed(
    &storage,
    &scope,
    &["Anne Bernard"],
    Utc::now() - ChronoDuration::hours(1),
  );

  let layer = layer_over(&storage, &scope);
  let mut query: Query<Vec<String>> = layer.query(
    KEY,
    || async { Err(FetchError::permanent("Backend returned 403 Forbidden")) },
    QueryOptions::default(),
  );
  query.settled().await;

  let view = query.view();
  assert_eq!(view.data.map(Vec::len), Some(1));
  assert!(view.error.is_some());
  assert!(!view.loading);
  assert_eq!(query.status(), QueryStatus::Errored);
}

#[tokio::test(start_paused = true)]
async fn test_sign_out_forgets_persisted_data() {
  let storage = Arc::new(MemoryStorage::new());
  let alice = CacheScope::user("alice@example.org");
  let bob = CacheScope::user("bob@example.org");
  seed(&storage, &alice, &["Anne Bernard"], Utc::now());
  seed(&storage, &bob, &["Paul Roux"], Utc::now());

  let layer = layer_over(&storage, &alice);
  let (mut query, _calls) = mount(
    &layer,
    &["Anne Bernard"],
    QueryOptions::default().with_revalidate_on_mount(false),
  );
  assert!(query.data().is_some());

  layer.sign_out();
  query.poll();

  assert!(query.data().is_none());
  assert_eq!(storage.get(&alice.storage_key()).unwrap(), None);
  // Other users' snapshots are untouched
  assert!(storage.get(&bob.storage_key()).unwrap().is_some());
}
