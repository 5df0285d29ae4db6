//! Immutable catalog snapshots.

use crate::identity::Timestamp;
use crate::item::{CategoryName, Item, ItemSummary};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

/// The in-memory copy of a catalog plus its load timestamp.
///
/// A snapshot is never mutated once shared. Bulk loads publish a brand new
/// snapshot; fallback merges publish a copy with one extra item. Items are
/// shared between a snapshot and its merged copies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    items: Vec<ItemSummary>,
    content_by_key: HashMap<String, Arc<Item>>,
    categories: BTreeSet<CategoryName>,
    loaded_at: Timestamp,
}

impl Snapshot {
    /// Assemble a snapshot from loaded items.
    ///
    /// Items are ordered by category, then display name, then key. When two
    /// items share a key the first one wins.
    pub fn assemble(items: Vec<Item>, loaded_at: Timestamp) -> Self {
        let mut content_by_key = HashMap::with_capacity(items.len());
        for item in items {
            content_by_key
                .entry(item.key.clone())
                .or_insert_with(|| Arc::new(item));
        }

        let mut summaries: Vec<ItemSummary> =
            content_by_key.values().map(|item| item.summary()).collect();
        summaries.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

        let categories = summaries.iter().map(|s| s.category.clone()).collect();

        Self {
            items: summaries,
            content_by_key,
            categories,
            loaded_at,
        }
    }

    /// Copy of this snapshot with one additional item.
    ///
    /// Returns `None` when the key is already present; merges never overwrite.
    pub fn with_merged(&self, item: Item) -> Option<Self> {
        if self.content_by_key.contains_key(&item.key) {
            return None;
        }

        let summary = item.summary();
        let mut next = self.clone();
        let position = next
            .items
            .partition_point(|existing| existing.sort_key() < summary.sort_key());
        next.items.insert(position, summary);
        next.categories.insert(item.category.clone());
        next.content_by_key.insert(item.key.clone(), Arc::new(item));
        Some(next)
    }

    /// Items in presentation order.
    pub fn items(&self) -> &[ItemSummary] {
        &self.items
    }

    /// Sorted distinct categories containing at least one item.
    pub fn categories(&self) -> &BTreeSet<CategoryName> {
        &self.categories
    }

    pub fn get(&self, key: &str) -> Option<&Item> {
        self.content_by_key.get(key).map(Arc::as_ref)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.content_by_key.contains_key(key)
    }

    pub fn loaded_at(&self) -> Timestamp {
        self.loaded_at
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items belonging to one category, in presentation order.
    pub fn items_in_category(&self, category: &str) -> Vec<ItemSummary> {
        self.items
            .iter()
            .filter(|item| item.category == category)
            .cloned()
            .collect()
    }

    /// Whether the snapshot is still valid at `now` for the given TTL.
    ///
    /// Valid iff `now - loaded_at < ttl`. A load timestamp in the future
    /// (clock skew) counts as fresh.
    pub fn is_fresh(&self, now: Timestamp, ttl: Duration) -> bool {
        let age = now.signed_duration_since(self.loaded_at);
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => age < ttl,
            // A TTL too large for chrono never expires.
            Err(_) => true,
        }
    }

    /// SHA-256 over every key and content in presentation order, hex encoded.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for summary in &self.items {
            hasher.update(summary.key.as_bytes());
            hasher.update([0u8]);
            if let Some(item) = self.content_by_key.get(&summary.key) {
                hasher.update(item.content.as_bytes());
            }
            hasher.update([0u8]);
        }
        hex::encode(hasher.finalize())
    }

    /// Lightweight description of this snapshot.
    pub fn info(&self) -> SnapshotInfo {
        SnapshotInfo {
            loaded_at: self.loaded_at,
            item_count: self.items.len(),
            category_count: self.categories.len(),
            fingerprint: self.fingerprint(),
        }
    }

    /// Listing view handed to callers of `list_all`.
    pub fn listing(&self) -> CatalogListing {
        CatalogListing {
            items: self.items.clone(),
            categories: self.categories.iter().cloned().collect(),
        }
    }
}

/// Ordered item metadata plus the category set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogListing {
    pub items: Vec<ItemSummary>,
    pub categories: Vec<CategoryName>,
}

/// Summary of a published snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    pub loaded_at: Timestamp,
    pub item_count: usize,
    pub category_count: usize,
    pub fingerprint: String,
}
