//! Snapshot cache with single-flight loading and explicit staleness.
//!
//! A [`CatalogCache`] holds at most one published snapshot per principal.
//! Reads inside the TTL never touch the store; an expired or missing
//! snapshot triggers exactly one bulk load no matter how many callers ask
//! for it at once.
//!
//! Reads that come from the cache return a [`CacheRead<T>`] so callers can
//! see when the data they got was loaded and whether they waited for it.
//!
//! # Example
//!
//! ```ignore
//! let cache = CatalogCache::new(&CatalogConfig::default());
//! let read = cache.list_all(&store).await?;
//!
//! if read.staleness() > Duration::from_secs(300) {
//!     tracing::debug!("Serving a catalog that is getting old");
//! }
//! ```

pub mod catalog_cache;
pub mod freshness;
pub mod stats;

pub use catalog_cache::{CatalogCache, ItemLookup};
pub use freshness::{CacheRead, Clock, ManualClock, SystemClock};
pub use stats::CacheStats;
