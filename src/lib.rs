//! Revalidating cache for the formation portal.
//!
//! [`cache::CacheLayer`] keeps one entry per key, deduplicates requests,
//! serves stale values while refreshing and mirrors itself to durable
//! storage through a coalescing writer. [`query::Query`] is the consumer
//! handle and [`view::ViewState`] the derived state screens render from.

pub mod cache;
pub mod config;
pub mod logging;
pub mod portal;
pub mod query;
pub mod view;
