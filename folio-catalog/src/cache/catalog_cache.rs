//! Per-principal catalog cache.
//!
//! Serves reads from an immutable [`Snapshot`], reloads it through the
//! [`CatalogLoader`] when absent or expired, and collapses concurrent reload
//! requests into one shared in-flight load.
//!
//! # Locking
//!
//! All state lives behind one synchronous mutex that is only held to decide
//! whether to serve, join or start a load, and to publish results. It is
//! never held across an `.await`, so readers of a valid snapshot never wait
//! on network calls.
//!
//! # Generations
//!
//! `generation` increments every time a load publishes and every time the
//! cache is invalidated. A load only publishes if no invalidation happened
//! while it ran, and a fallback merge only applies to the exact load
//! generation it read from.

use futures_util::future::{BoxFuture, FutureExt, Shared};
use folio_core::{
    CatalogConfig, CatalogError, CatalogListing, CatalogResult, FolioResult, Item, ItemKey,
    ItemSummary, Snapshot, SnapshotInfo, StoreError,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::freshness::{CacheRead, Clock, SystemClock};
use super::stats::{CacheStats, StatsRecorder};
use crate::fallback::FallbackResolver;
use crate::loader::CatalogLoader;
use crate::store::StoreHandle;

/// A snapshot together with the generation of the load that produced it.
#[derive(Debug, Clone)]
struct Published {
    snapshot: Arc<Snapshot>,
    generation: u64,
}

type SharedLoad = Shared<BoxFuture<'static, CatalogResult<Published>>>;

struct InFlight {
    id: u64,
    /// Generation at the time the load started.
    generation: u64,
    future: SharedLoad,
}

#[derive(Default)]
struct CacheState {
    published: Option<Published>,
    in_flight: Option<InFlight>,
    generation: u64,
}

enum NextStep {
    Serve(Published),
    Join(SharedLoad),
    /// An invalidation overtook the running load: let it finish, then retry.
    AwaitStale(SharedLoad),
}

/// Outcome of a point lookup, keeping the reason behind a miss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemLookup {
    /// Found in the bulk snapshot.
    Cached(Item),
    /// Found by the fallback resolver.
    Resolved(Item),
    /// Absent from the snapshot and the fallback could not produce it.
    /// Carries `NotFound` or the transport error that stopped the lookup.
    Missing(CatalogError),
}

impl ItemLookup {
    pub fn item(&self) -> Option<&Item> {
        match self {
            ItemLookup::Cached(item) | ItemLookup::Resolved(item) => Some(item),
            ItemLookup::Missing(_) => None,
        }
    }

    pub fn into_item(self) -> Option<Item> {
        match self {
            ItemLookup::Cached(item) | ItemLookup::Resolved(item) => Some(item),
            ItemLookup::Missing(_) => None,
        }
    }
}

struct CacheInner {
    state: Mutex<CacheState>,
    loader: CatalogLoader,
    fallback: FallbackResolver,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    stats: StatsRecorder,
    next_load_id: AtomicU64,
}

/// Catalog cache for one principal.
///
/// Cloning is cheap and every clone shares the same state.
#[derive(Clone)]
pub struct CatalogCache {
    inner: Arc<CacheInner>,
}

impl std::fmt::Debug for CatalogCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock_state();
        f.debug_struct("CatalogCache")
            .field("generation", &state.generation)
            .field("loaded", &state.published.is_some())
            .field("loading", &state.in_flight.is_some())
            .finish()
    }
}

impl CatalogCache {
    /// Create an empty cache using the wall clock.
    pub fn new(config: &CatalogConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create an empty cache driven by `clock`.
    pub fn with_clock(config: &CatalogConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                state: Mutex::new(CacheState::default()),
                loader: CatalogLoader::new(config, Arc::clone(&clock)),
                fallback: FallbackResolver::new(config),
                clock,
                ttl: config.ttl,
                stats: StatsRecorder::default(),
                next_load_id: AtomicU64::new(1),
            }),
        }
    }

    /// The ordered item listing and category set, loading first if the
    /// snapshot is absent or expired.
    pub async fn list_all(&self, store: &StoreHandle) -> FolioResult<CacheRead<CatalogListing>> {
        let (published, hit) = self.valid_snapshot(store).await?;
        let loaded_at = published.snapshot.loaded_at();
        let listing = published.snapshot.listing();
        Ok(if hit {
            CacheRead::from_cache(listing, loaded_at)
        } else {
            CacheRead::from_load(listing, loaded_at)
        })
    }

    /// Items of one category from the valid snapshot.
    pub async fn list_category(
        &self,
        store: &StoreHandle,
        category: &str,
    ) -> FolioResult<Vec<ItemSummary>> {
        let (published, _) = self.valid_snapshot(store).await?;
        Ok(published.snapshot.items_in_category(category))
    }

    /// Look up one item, falling back to a point lookup on a snapshot miss.
    ///
    /// Returns `Ok(None)` when neither the snapshot nor the fallback has the
    /// item. Malformed keys and bulk load failures are errors.
    pub async fn get_by_key(&self, store: &StoreHandle, key: &str) -> FolioResult<Option<Item>> {
        Ok(self.get_by_key_detailed(store, key).await?.into_item())
    }

    /// Like [`get_by_key`](Self::get_by_key) but keeps the reason for a miss.
    pub async fn get_by_key_detailed(
        &self,
        store: &StoreHandle,
        key: &str,
    ) -> FolioResult<ItemLookup> {
        let parsed = ItemKey::parse(key)?;
        let (published, _) = self.valid_snapshot(store).await?;

        if let Some(item) = published.snapshot.get(key) {
            return Ok(ItemLookup::Cached(item.clone()));
        }

        tracing::debug!(key = %key, "Snapshot miss, resolving item directly");
        match self.inner.fallback.resolve_key(store.as_ref(), &parsed).await {
            Ok(item) => {
                StatsRecorder::bump(&self.inner.stats.fallback_hits);
                self.inner.merge(&published, item.clone());
                Ok(ItemLookup::Resolved(item))
            }
            Err(e) => {
                StatsRecorder::bump(&self.inner.stats.fallback_misses);
                tracing::warn!(key = %key, error = %e, "Fallback lookup failed");
                Ok(ItemLookup::Missing(e))
            }
        }
    }

    /// Make the current snapshot unusable so the next read reloads.
    pub fn invalidate(&self) {
        let mut state = self.inner.lock_state();
        state.published = None;
        state.generation += 1;
        StatsRecorder::bump(&self.inner.stats.invalidations);
        tracing::debug!(generation = state.generation, "Catalog cache invalidated");
    }

    /// Description of the currently published snapshot, fresh or not.
    /// Never triggers a load.
    pub fn snapshot_info(&self) -> Option<SnapshotInfo> {
        let state = self.inner.lock_state();
        state.published.as_ref().map(|p| p.snapshot.info())
    }

    /// Whether a valid snapshot is published right now.
    pub fn is_warm(&self) -> bool {
        let now = self.inner.clock.now();
        let state = self.inner.lock_state();
        state
            .published
            .as_ref()
            .is_some_and(|p| p.snapshot.is_fresh(now, self.inner.ttl))
    }

    /// Whether a load is currently running.
    pub fn is_loading(&self) -> bool {
        self.inner.lock_state().in_flight.is_some()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats.snapshot()
    }

    /// Return a valid snapshot and whether it was already valid on entry.
    async fn valid_snapshot(&self, store: &StoreHandle) -> CatalogResult<(Published, bool)> {
        let mut first_attempt = true;
        loop {
            let step = self.next_step(store);
            match step {
                NextStep::Serve(published) => {
                    if first_attempt {
                        StatsRecorder::bump(&self.inner.stats.hits);
                    }
                    return Ok((published, first_attempt));
                }
                NextStep::Join(load) => {
                    if first_attempt {
                        StatsRecorder::bump(&self.inner.stats.misses);
                    }
                    return load.await.map(|published| (published, false));
                }
                NextStep::AwaitStale(load) => {
                    if first_attempt {
                        StatsRecorder::bump(&self.inner.stats.misses);
                    }
                    first_attempt = false;
                    // The outcome belongs to a load that was invalidated.
                    let _ = load.await;
                }
            }
        }
    }

    /// Decide, under the state lock, whether to serve, join or start a load.
    fn next_step(&self, store: &StoreHandle) -> NextStep {
        let now = self.inner.clock.now();
        let mut state = self.inner.lock_state();

        if let Some(published) = &state.published {
            if published.snapshot.is_fresh(now, self.inner.ttl) {
                return NextStep::Serve(published.clone());
            }
        }

        if let Some(in_flight) = &state.in_flight {
            tracing::debug!(load = in_flight.id, "Joining in-flight catalog load");
            return if in_flight.generation == state.generation {
                NextStep::Join(in_flight.future.clone())
            } else {
                NextStep::AwaitStale(in_flight.future.clone())
            };
        }

        let future = self.start_load(&mut state, store);
        NextStep::Join(future)
    }

    /// Spawn a load and record it as in flight. Caller holds the state lock.
    fn start_load(&self, state: &mut CacheState, store: &StoreHandle) -> SharedLoad {
        let id = self.inner.next_load_id.fetch_add(1, Ordering::Relaxed);
        let generation = state.generation;
        StatsRecorder::bump(&self.inner.stats.loads_started);

        let task = tokio::spawn(Arc::clone(&self.inner).run_load(
            Arc::clone(store),
            id,
            generation,
        ));

        let inner = Arc::clone(&self.inner);
        let future = async move {
            match task.await {
                Ok(result) => result,
                Err(join_err) => {
                    // The load task died without clearing its slot.
                    inner.finish_load(id);
                    StatsRecorder::bump(&inner.stats.loads_failed);
                    Err(CatalogError::load_failed(CatalogError::Transport(
                        StoreError::Transport {
                            operation: "catalog_load".to_string(),
                            reason: join_err.to_string(),
                        },
                    )))
                }
            }
        }
        .boxed()
        .shared();

        state.in_flight = Some(InFlight {
            id,
            generation,
            future: future.clone(),
        });
        future
    }
}

impl CacheInner {
    fn lock_state(&self) -> MutexGuard<'_, CacheState> {
        // Critical sections never panic midway, so a poisoned lock still
        // guards consistent state.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Body of the spawned load task.
    ///
    /// Clears the in-flight slot before returning, so every waiter observes a
    /// retryable cache by the time it receives the result.
    async fn run_load(
        self: Arc<Self>,
        store: StoreHandle,
        id: u64,
        generation: u64,
    ) -> CatalogResult<Published> {
        let result = self.loader.load(store.as_ref()).await;

        let mut state = self.lock_state();
        if state.in_flight.as_ref().is_some_and(|f| f.id == id) {
            state.in_flight = None;
        }

        match result {
            Ok(outcome) => {
                let snapshot = Arc::new(outcome.snapshot);
                if state.generation == generation {
                    state.generation += 1;
                    let published = Published {
                        snapshot,
                        generation: state.generation,
                    };
                    state.published = Some(published.clone());
                    Ok(published)
                } else {
                    tracing::debug!(
                        load_id = %outcome.report.load_id,
                        "Cache invalidated during load, result not published"
                    );
                    Ok(Published {
                        snapshot,
                        generation,
                    })
                }
            }
            Err(e) => {
                StatsRecorder::bump(&self.stats.loads_failed);
                Err(e)
            }
        }
    }

    fn finish_load(&self, id: u64) {
        let mut state = self.lock_state();
        if state.in_flight.as_ref().is_some_and(|f| f.id == id) {
            state.in_flight = None;
        }
    }

    /// Add a fallback result to the snapshot it was missing from.
    ///
    /// Skipped if a reload or invalidation replaced that snapshot meanwhile.
    fn merge(&self, observed: &Published, item: Item) {
        let mut state = self.lock_state();
        let next = match &state.published {
            Some(current) if current.generation == observed.generation => {
                current.snapshot.with_merged(item).map(|merged| Published {
                    snapshot: Arc::new(merged),
                    generation: current.generation,
                })
            }
            _ => {
                StatsRecorder::bump(&self.stats.merges_skipped);
                tracing::debug!("Snapshot replaced during fallback lookup, merge skipped");
                None
            }
        };

        if let Some(next) = next {
            state.published = Some(next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::memory::InMemoryCatalogStore;
    use crate::store::{FolderRef, StoreOperation};

    struct Fixture {
        store: Arc<InMemoryCatalogStore>,
        drafting: FolderRef,
        handle: StoreHandle,
        clock: Arc<ManualClock>,
        cache: CatalogCache,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryCatalogStore::new());
        let root = store.add_folder(None, "Tools");
        let drafting = store.add_folder(Some(&root), "Drafting");
        store.add_file(&drafting, "outline.txt", "outline");
        store.add_file(&drafting, "scene_builder.txt", "scenes");

        let clock = Arc::new(ManualClock::starting_now());
        let cache = CatalogCache::with_clock(&CatalogConfig::default(), clock.clone());
        let handle: StoreHandle = store.clone();
        Fixture {
            store,
            drafting,
            handle,
            clock,
            cache,
        }
    }

    #[tokio::test]
    async fn test_first_read_loads_then_hits() {
        let f = fixture();

        let first = f.cache.list_all(&f.handle).await.unwrap();
        assert!(first.was_cache_miss());
        assert_eq!(first.value().items.len(), 2);

        let calls = f.store.total_calls();
        let second = f.cache.list_all(&f.handle).await.unwrap();
        assert!(second.was_cache_hit());
        assert_eq!(f.store.total_calls(), calls);

        let stats = f.cache.stats();
        assert_eq!(stats.loads_started, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_expiry_triggers_reload() {
        let f = fixture();
        f.cache.list_all(&f.handle).await.unwrap();
        assert!(f.cache.is_warm());

        f.clock.advance(Duration::from_secs(601));
        assert!(!f.cache.is_warm());

        f.cache.list_all(&f.handle).await.unwrap();
        assert_eq!(f.cache.stats().loads_started, 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_reload() {
        let f = fixture();
        f.cache.list_all(&f.handle).await.unwrap();
        f.cache.invalidate();
        assert!(f.cache.snapshot_info().is_none());

        f.cache.list_all(&f.handle).await.unwrap();
        assert_eq!(f.cache.stats().loads_started, 2);
        assert_eq!(f.cache.stats().invalidations, 1);
    }

    #[tokio::test]
    async fn test_failed_load_is_retryable() {
        let f = fixture();
        f.store.fail_operation(
            StoreOperation::FindFolder,
            StoreError::Unauthorized {
                operation: "find_folder".to_string(),
            },
        );

        let err = f.cache.list_all(&f.handle).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(!f.cache.is_loading());

        f.store.clear_faults();
        let listing = f.cache.list_all(&f.handle).await.unwrap();
        assert_eq!(listing.value().items.len(), 2);
        assert_eq!(f.cache.stats().loads_failed, 1);
    }

    #[tokio::test]
    async fn test_get_by_key_cached_and_resolved() {
        let f = fixture();

        let lookup = f
            .cache
            .get_by_key_detailed(&f.handle, "Drafting/outline")
            .await
            .unwrap();
        assert!(matches!(lookup, ItemLookup::Cached(_)));

        f.store.add_file(&f.drafting, "late_arrival.txt", "new");

        let lookup = f
            .cache
            .get_by_key_detailed(&f.handle, "Drafting/late_arrival")
            .await
            .unwrap();
        assert!(matches!(lookup, ItemLookup::Resolved(ref item) if item.content == "new"));

        let again = f
            .cache
            .get_by_key_detailed(&f.handle, "Drafting/late_arrival")
            .await
            .unwrap();
        assert!(matches!(again, ItemLookup::Cached(_)));
    }

    #[tokio::test]
    async fn test_get_by_key_missing_keeps_reason() {
        let f = fixture();
        let lookup = f
            .cache
            .get_by_key_detailed(&f.handle, "Drafting/nope")
            .await
            .unwrap();
        assert!(matches!(lookup, ItemLookup::Missing(CatalogError::NotFound { .. })));

        let item = f.cache.get_by_key(&f.handle, "Drafting/nope").await.unwrap();
        assert!(item.is_none());
        assert_eq!(f.cache.stats().fallback_misses, 2);
    }

    #[tokio::test]
    async fn test_merge_skipped_after_invalidation() {
        let f = fixture();
        f.cache.list_all(&f.handle).await.unwrap();
        let observed = f.cache.inner.lock_state().published.clone().unwrap();

        f.cache.invalidate();
        f.cache.list_all(&f.handle).await.unwrap();

        let item = Item::from_file("Drafting", "ghost.txt", "boo".to_string(), f.clock.now());
        f.cache.inner.merge(&observed, item);

        let listing = f.cache.list_all(&f.handle).await.unwrap().into_value();
        assert!(listing.items.iter().all(|i| i.key != "Drafting/ghost"));
        assert_eq!(f.cache.stats().merges_skipped, 1);
    }
}
