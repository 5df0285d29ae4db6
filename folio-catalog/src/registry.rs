//! Per-principal cache registry.
//!
//! Maps each principal to exactly one [`CatalogCache`] plus the most recent
//! store handle it was resolved with. Handles carry credentials that expire,
//! so every resolve replaces the handle while leaving the cache untouched.
//!
//! The registry is bounded: beyond `max_principals` entries the least
//! recently resolved one is dropped, and [`CatalogRegistry::evict_idle`]
//! removes entries unused for longer than `principal_idle_ttl`.

use dashmap::DashMap;
use folio_core::{
    CatalogConfig, CatalogListing, FolioResult, Item, ItemSummary, PrincipalId, SnapshotInfo,
    Timestamp,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheRead, CacheStats, CatalogCache, Clock, ItemLookup, SystemClock};
use crate::store::StoreHandle;

struct RegistryEntry {
    cache: CatalogCache,
    store: StoreHandle,
    last_access: Timestamp,
    /// Monotonic access order, used to pick the LRU victim.
    access_seq: u64,
}

/// A principal's cache bound to its current store handle.
#[derive(Clone)]
pub struct CatalogHandle {
    principal: PrincipalId,
    cache: CatalogCache,
    store: StoreHandle,
}

impl std::fmt::Debug for CatalogHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogHandle")
            .field("principal", &self.principal)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl CatalogHandle {
    pub fn principal(&self) -> &PrincipalId {
        &self.principal
    }

    pub fn cache(&self) -> &CatalogCache {
        &self.cache
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    pub async fn list_all(&self) -> FolioResult<CacheRead<CatalogListing>> {
        self.cache.list_all(&self.store).await
    }

    pub async fn list_category(&self, category: &str) -> FolioResult<Vec<ItemSummary>> {
        self.cache.list_category(&self.store, category).await
    }

    pub async fn get_item(&self, key: &str) -> FolioResult<Option<Item>> {
        self.cache.get_by_key(&self.store, key).await
    }

    pub async fn get_item_detailed(&self, key: &str) -> FolioResult<ItemLookup> {
        self.cache.get_by_key_detailed(&self.store, key).await
    }

    pub fn invalidate(&self) {
        self.cache.invalidate();
    }

    pub fn snapshot_info(&self) -> Option<SnapshotInfo> {
        self.cache.snapshot_info()
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

/// Registry of catalog caches keyed by principal.
pub struct CatalogRegistry {
    entries: DashMap<PrincipalId, RegistryEntry>,
    config: CatalogConfig,
    clock: Arc<dyn Clock>,
    access_seq: AtomicU64,
}

impl std::fmt::Debug for CatalogRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogRegistry")
            .field("principals", &self.entries.len())
            .field("config", &self.config)
            .finish()
    }
}

impl CatalogRegistry {
    /// Create a registry using the wall clock.
    pub fn new(config: CatalogConfig) -> FolioResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a registry whose caches all share `clock`.
    pub fn with_clock(config: CatalogConfig, clock: Arc<dyn Clock>) -> FolioResult<Self> {
        config.validate()?;
        Ok(Self {
            entries: DashMap::new(),
            config,
            clock,
            access_seq: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    /// Get the principal's cache, creating an empty one if needed, and bind
    /// it to `store`.
    ///
    /// An existing entry keeps its cache and snapshot; only the handle is
    /// replaced.
    pub fn resolve(&self, principal: &PrincipalId, store: StoreHandle) -> CatalogHandle {
        let now = self.clock.now();
        let seq = self.access_seq.fetch_add(1, Ordering::Relaxed);

        let handle = {
            let mut entry = self.entries.entry(principal.clone()).or_insert_with(|| {
                tracing::debug!(principal = %principal, "Creating catalog cache");
                RegistryEntry {
                    cache: CatalogCache::with_clock(&self.config, Arc::clone(&self.clock)),
                    store: Arc::clone(&store),
                    last_access: now,
                    access_seq: seq,
                }
            });
            entry.store = store;
            entry.last_access = now;
            entry.access_seq = seq;

            CatalogHandle {
                principal: principal.clone(),
                cache: entry.cache.clone(),
                store: Arc::clone(&entry.store),
            }
        };

        self.enforce_capacity(principal, seq);
        handle
    }

    /// Drop the principal's entry. Returns whether one existed.
    pub fn clear(&self, principal: &PrincipalId) -> bool {
        let removed = self.entries.remove(principal).is_some();
        if removed {
            tracing::debug!(principal = %principal, "Catalog cache cleared");
        }
        removed
    }

    /// Alias of [`clear`](Self::clear), for logout paths.
    pub fn clear_principal(&self, principal: &PrincipalId) -> bool {
        self.clear(principal)
    }

    /// Invalidate the principal's snapshot without dropping the entry.
    /// Returns whether the principal was known.
    pub fn invalidate(&self, principal: &PrincipalId) -> bool {
        match self.entries.get(principal) {
            Some(entry) => {
                entry.cache.invalidate();
                true
            }
            None => false,
        }
    }

    pub async fn list_all(
        &self,
        principal: &PrincipalId,
        store: StoreHandle,
    ) -> FolioResult<CacheRead<CatalogListing>> {
        self.resolve(principal, store).list_all().await
    }

    pub async fn get_item(
        &self,
        principal: &PrincipalId,
        store: StoreHandle,
        key: &str,
    ) -> FolioResult<Option<Item>> {
        self.resolve(principal, store).get_item(key).await
    }

    /// Remove entries not resolved within `principal_idle_ttl` of `now`.
    /// Returns how many were removed.
    pub fn evict_idle(&self, now: Timestamp) -> usize {
        let idle_ttl = self.config.principal_idle_ttl;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !is_idle(entry.last_access, now, idle_ttl));
        let evicted = before.saturating_sub(self.entries.len());
        if evicted > 0 {
            tracing::info!(evicted, remaining = self.entries.len(), "Evicted idle catalog caches");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, principal: &PrincipalId) -> bool {
        self.entries.contains_key(principal)
    }

    /// Drop least recently resolved entries until within capacity, never
    /// dropping `keep`.
    ///
    /// Only entries last resolved before `seq` are candidates. An entry
    /// resolved concurrently after this call began is left to that call's
    /// own sweep.
    fn enforce_capacity(&self, keep: &PrincipalId, seq: u64) {
        while self.entries.len() > self.config.max_principals {
            let victim = self
                .entries
                .iter()
                .filter(|entry| entry.key() != keep && entry.value().access_seq < seq)
                .min_by_key(|entry| entry.value().access_seq)
                .map(|entry| entry.key().clone());

            match victim {
                Some(victim) => {
                    self.entries.remove(&victim);
                    tracing::info!(principal = %victim, "Evicted least recently used catalog cache");
                }
                None => break,
            }
        }
    }
}

fn is_idle(last_access: Timestamp, now: Timestamp, idle_ttl: Duration) -> bool {
    match now.signed_duration_since(last_access).to_std() {
        Ok(age) => age >= idle_ttl,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::memory::InMemoryCatalogStore;

    fn populated_store() -> Arc<InMemoryCatalogStore> {
        let store = Arc::new(InMemoryCatalogStore::new());
        let root = store.add_folder(None, "Tools");
        let drafting = store.add_folder(Some(&root), "Drafting");
        store.add_file(&drafting, "outline.txt", "outline");
        store
    }

    fn registry(config: CatalogConfig) -> (CatalogRegistry, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let registry = CatalogRegistry::with_clock(config, clock.clone()).unwrap();
        (registry, clock)
    }

    #[test]
    fn test_rejects_invalid_config() {
        let result = CatalogRegistry::new(CatalogConfig::default().with_max_principals(0));
        assert!(result.is_err());
    }

    #[test]
    fn test_capacity_sweep_spares_later_resolutions() {
        let (registry, clock) = registry(CatalogConfig::default().with_max_principals(1));
        let a = PrincipalId::from("a");
        let b = PrincipalId::from("b");
        registry.resolve(&a, populated_store());

        // b resolved after a, but its own sweep has not run yet.
        let clock_handle: Arc<dyn Clock> = clock.clone();
        registry.entries.insert(
            b.clone(),
            RegistryEntry {
                cache: CatalogCache::with_clock(registry.config(), clock_handle),
                store: populated_store(),
                last_access: clock.now(),
                access_seq: 5,
            },
        );

        registry.enforce_capacity(&a, 0);
        assert_eq!(registry.len(), 2);

        registry.enforce_capacity(&b, 5);
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&b));
        assert!(!registry.contains(&a));
    }

    #[tokio::test]
    async fn test_resolve_reuses_cache_and_swaps_handle() {
        let (registry, _) = registry(CatalogConfig::default());
        let alice = PrincipalId::from("alice");

        let first_store = populated_store();
        let first = registry.resolve(&alice, first_store.clone());
        first.list_all().await.unwrap();

        let second_store = populated_store();
        let second = registry.resolve(&alice, second_store.clone());
        let read = second.list_all().await.unwrap();

        assert!(read.was_cache_hit());
        assert_eq!(registry.len(), 1);
        assert_eq!(second_store.total_calls(), 0);

        // Each handle loads through the store it was resolved with.
        let first_calls = first_store.total_calls();
        registry.invalidate(&alice);
        first.list_all().await.unwrap();
        assert_eq!(first_store.total_calls(), first_calls * 2);
        assert_eq!(second_store.total_calls(), 0);

        registry.invalidate(&alice);
        registry
            .list_all(&alice, second_store.clone())
            .await
            .unwrap();
        assert_eq!(second_store.total_calls(), first_calls);
    }

    #[tokio::test]
    async fn test_principals_are_isolated() {
        let (registry, _) = registry(CatalogConfig::default());
        let store = populated_store();

        registry
            .list_all(&PrincipalId::from("alice"), store.clone())
            .await
            .unwrap();
        let read = registry
            .list_all(&PrincipalId::from("bob"), store.clone())
            .await
            .unwrap();

        assert!(read.was_cache_miss());
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_clear_and_invalidate() {
        let (registry, _) = registry(CatalogConfig::default());
        let alice = PrincipalId::from("alice");
        let store = populated_store();

        let handle = registry.resolve(&alice, store.clone());
        handle.list_all().await.unwrap();

        assert!(registry.invalidate(&alice));
        assert!(handle.snapshot_info().is_none());

        assert!(registry.clear_principal(&alice));
        assert!(!registry.contains(&alice));
        assert!(!registry.clear(&alice));
        assert!(!registry.invalidate(&alice));
    }

    #[test]
    fn test_lru_eviction_beyond_capacity() {
        let (registry, _) = registry(CatalogConfig::default().with_max_principals(2));
        let store: StoreHandle = populated_store();
        let (a, b, c) = (
            PrincipalId::from("a"),
            PrincipalId::from("b"),
            PrincipalId::from("c"),
        );

        registry.resolve(&a, store.clone());
        registry.resolve(&b, store.clone());
        registry.resolve(&a, store.clone());
        registry.resolve(&c, store.clone());

        assert_eq!(registry.len(), 2);
        assert!(registry.contains(&a));
        assert!(!registry.contains(&b));
        assert!(registry.contains(&c));
    }

    #[test]
    fn test_evict_idle() {
        let (registry, clock) = registry(
            CatalogConfig::default().with_principal_idle_ttl(Duration::from_secs(60)),
        );
        let store: StoreHandle = populated_store();
        let (a, b) = (PrincipalId::from("a"), PrincipalId::from("b"));

        registry.resolve(&a, store.clone());
        clock.advance(Duration::from_secs(45));
        registry.resolve(&b, store.clone());
        clock.advance(Duration::from_secs(30));

        assert_eq!(registry.evict_idle(clock.now()), 1);
        assert!(!registry.contains(&a));
        assert!(registry.contains(&b));
    }
}
