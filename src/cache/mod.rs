//! Persisted, revalidating cache layer.
//!
//! This module provides a keyed stale-while-revalidate cache that:
//! - Deduplicates concurrent requests (at most one in flight per key)
//! - Serves cached values immediately while refreshing in the background
//! - Refreshes on an interval, on focus and on reconnect
//! - Keeps the last good value when a request fails and retries with a bounded budget
//! - Mirrors its entries to durable storage with debounced writes

mod entry;
mod error;
mod layer;
pub mod provider;
mod snapshot;
pub mod status;
pub mod storage;
pub mod writer;

pub use entry::{CacheEntry, EntrySnapshot};
pub use error::{FetchError, FetchErrorKind};
pub use layer::CacheLayer;
pub use provider::{CacheProvider, MemoryProvider, PersistSettings, PersistentProvider};
pub use snapshot::{CacheScope, PersistedEntry, Snapshot, SNAPSHOT_VERSION};
pub use status::{QueryEvent, QueryStatus};
pub use storage::{DurableStorage, MemoryStorage, SqliteStorage};
pub use writer::{CoalescingWriter, WriterSettings};
