//! Clocks and freshness metadata for cache reads.
//!
//! Snapshot validity is decided against an injectable [`Clock`] so expiry
//! can be driven deterministically.

use chrono::Utc;
use folio_core::Timestamp;
use std::fmt;
use std::sync::RwLock;
use std::time::Duration;

/// Source of the current time for TTL decisions.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Timestamp;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<Timestamp>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: RwLock::new(start),
        }
    }

    /// Create a clock frozen at the current wall-clock time.
    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let by = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::MAX);
        let mut now = self.now.write().unwrap_or_else(|e| e.into_inner());
        *now = now.checked_add_signed(by).unwrap_or(*now);
    }

    /// Jump the clock to `at`.
    pub fn set(&self, at: Timestamp) {
        *self.now.write().unwrap_or_else(|e| e.into_inner()) = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.read().unwrap_or_else(|e| e.into_inner())
    }
}

/// Result of a cache read, carrying the age of the data it came from.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    /// The value read.
    value: T,
    /// When the snapshot backing this value was loaded.
    loaded_at: Timestamp,
    /// Whether the value came from an already-valid snapshot.
    was_cache_hit: bool,
}

impl<T> CacheRead<T> {
    /// A read served from a snapshot that was already valid.
    pub fn from_cache(value: T, loaded_at: Timestamp) -> Self {
        Self {
            value,
            loaded_at,
            was_cache_hit: true,
        }
    }

    /// A read that had to wait for a bulk load.
    pub fn from_load(value: T, loaded_at: Timestamp) -> Self {
        Self {
            value,
            loaded_at,
            was_cache_hit: false,
        }
    }

    /// Consume the wrapper and return the underlying value.
    pub fn into_value(self) -> T {
        self.value
    }

    /// Get a reference to the underlying value.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// When the backing snapshot was loaded.
    pub fn loaded_at(&self) -> Timestamp {
        self.loaded_at
    }

    /// Age of the backing snapshot at `now`; zero if loaded in the future.
    pub fn staleness_at(&self, now: Timestamp) -> Duration {
        now.signed_duration_since(self.loaded_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Age of the backing snapshot by the wall clock.
    pub fn staleness(&self) -> Duration {
        self.staleness_at(Utc::now())
    }

    pub fn was_cache_hit(&self) -> bool {
        self.was_cache_hit
    }

    pub fn was_cache_miss(&self) -> bool {
        !self.was_cache_hit
    }

    /// Map the inner value to a new type.
    pub fn map<U, F>(self, f: F) -> CacheRead<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheRead {
            value: f(self.value),
            loaded_at: self.loaded_at,
            was_cache_hit: self.was_cache_hit,
        }
    }
}

impl<T> AsRef<T> for CacheRead<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}
