//! Bulk catalog loader.
//!
//! One load walks the whole tree (store root → catalog root → category
//! folders → leaf files) and fetches every leaf's content. Listing and
//! content fetches run through bounded buffered streams, so the number of
//! round trips in flight never exceeds `fetch_concurrency`.
//!
//! Names that cannot form a two-segment key are dropped before any content
//! is fetched. When several files in a category share a stem, only the one
//! ranked first by [`FileEntry::precedence`] is fetched.

use futures_util::stream::{self, StreamExt};
use folio_core::{
    is_valid_segment, new_load_id, CatalogConfig, CatalogError, CatalogResult, CategoryName,
    Item, ItemKey, LoadId, Snapshot, StoreError,
};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cache::Clock;
use crate::store::{preferred_file, CatalogStore, FileEntry, FolderEntry};

/// A leaf that could not be loaded and was left out of the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedItem {
    pub category: CategoryName,
    /// `None` when the whole category was dropped.
    pub file_name: Option<String>,
    /// `Transport` for store failures, `InvalidKey` for unusable names.
    pub error: CatalogError,
}

/// What a single load saw and kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub load_id: LoadId,
    pub categories_seen: usize,
    pub files_discovered: usize,
    /// Files not fetched because another file with the same stem ranked first.
    pub files_shadowed: usize,
    pub items_loaded: usize,
    pub dropped: Vec<DroppedItem>,
}

impl LoadReport {
    pub fn is_partial(&self) -> bool {
        !self.dropped.is_empty()
    }
}

/// A successfully assembled snapshot and the report of the load behind it.
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub snapshot: Snapshot,
    pub report: LoadReport,
}

struct FetchTarget {
    category: CategoryName,
    file: FileEntry,
}

/// Performs full traversals of a catalog store.
#[derive(Debug, Clone)]
pub struct CatalogLoader {
    root_folder_name: String,
    content_mime_type: String,
    fetch_concurrency: usize,
    clock: Arc<dyn Clock>,
}

impl CatalogLoader {
    pub fn new(config: &CatalogConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            root_folder_name: config.root_folder_name.clone(),
            content_mime_type: config.content_mime_type.clone(),
            fetch_concurrency: config.fetch_concurrency.max(1),
            clock,
        }
    }

    /// Load a complete snapshot.
    ///
    /// Failing to resolve the root or list its categories fails the load.
    /// Failing to list one category or read one file drops just that part.
    pub async fn load(&self, store: &dyn CatalogStore) -> CatalogResult<LoadOutcome> {
        let load_id = new_load_id();
        tracing::info!(load_id = %load_id, root = %self.root_folder_name, "Catalog load started");

        let categories = self
            .discover_categories(store)
            .await
            .map_err(|e| {
                tracing::error!(load_id = %load_id, error = %e, "Catalog load failed");
                CatalogError::load_failed(e)
            })?;

        let mut dropped = Vec::new();
        let categories_seen = categories.len();

        let (targets, files_discovered) = self
            .list_targets(store, load_id, categories, &mut dropped)
            .await;
        let files_shadowed = files_discovered - targets.len();

        let items = self.fetch_contents(store, load_id, targets, &mut dropped).await;

        let snapshot = Snapshot::assemble(items, self.clock.now());
        let report = LoadReport {
            load_id,
            categories_seen,
            files_discovered,
            files_shadowed,
            items_loaded: snapshot.len(),
            dropped,
        };

        tracing::info!(
            load_id = %load_id,
            categories = report.categories_seen,
            files = report.files_discovered,
            shadowed = report.files_shadowed,
            items = report.items_loaded,
            dropped = report.dropped.len(),
            "Catalog load finished"
        );

        Ok(LoadOutcome { snapshot, report })
    }

    /// Steps 1 and 2: the catalog root and its category folders.
    async fn discover_categories(
        &self,
        store: &dyn CatalogStore,
    ) -> CatalogResult<Vec<FolderEntry>> {
        let root = store
            .find_folder(None, &self.root_folder_name)
            .await?
            .ok_or_else(|| CatalogError::RootNotFound {
                name: self.root_folder_name.clone(),
            })?;

        let categories = store.list_child_folders(&root).await?;
        if categories.is_empty() {
            return Err(CatalogError::NoCategories {
                root: self.root_folder_name.clone(),
            });
        }

        Ok(categories)
    }

    /// Steps 3 and 4: list every category concurrently and flatten the
    /// results into one fetch target per item key.
    ///
    /// Also returns how many files the listings held in total.
    async fn list_targets(
        &self,
        store: &dyn CatalogStore,
        load_id: LoadId,
        categories: Vec<FolderEntry>,
        dropped: &mut Vec<DroppedItem>,
    ) -> (Vec<FetchTarget>, usize) {
        let mime = self.content_mime_type.as_str();

        let (categories, unusable): (Vec<FolderEntry>, Vec<FolderEntry>) = categories
            .into_iter()
            .partition(|category| is_valid_segment(&category.name));
        for category in unusable {
            tracing::warn!(
                load_id = %load_id,
                category = %category.name,
                "Dropping category: name cannot be used in an item key"
            );
            dropped.push(DroppedItem {
                error: CatalogError::InvalidKey {
                    key: category.name.clone(),
                    reason: "category name is empty or contains '/'".to_string(),
                },
                category: category.name,
                file_name: None,
            });
        }

        let listings: Vec<(FolderEntry, Result<Vec<FileEntry>, StoreError>)> =
            stream::iter(categories)
                .map(|category| async move {
                    let files = store.list_files(&category.folder, mime).await;
                    (category, files)
                })
                .buffer_unordered(self.fetch_concurrency)
                .collect()
                .await;

        let mut discovered = 0;
        let mut by_key: BTreeMap<String, Vec<FetchTarget>> = BTreeMap::new();
        for (category, listing) in listings {
            let files = match listing {
                Ok(files) => files,
                Err(e) => {
                    tracing::warn!(
                        load_id = %load_id,
                        category = %category.name,
                        error = %e,
                        "Dropping category: file listing failed"
                    );
                    dropped.push(DroppedItem {
                        category: category.name,
                        file_name: None,
                        error: CatalogError::Transport(e),
                    });
                    continue;
                }
            };

            discovered += files.len();
            for file in files {
                match ItemKey::for_file(&category.name, &file.name) {
                    Ok(key) => by_key.entry(key.to_string()).or_default().push(FetchTarget {
                        category: category.name.clone(),
                        file,
                    }),
                    Err(e) => {
                        tracing::warn!(
                            load_id = %load_id,
                            category = %category.name,
                            file = %file.name,
                            error = %e,
                            "Dropping item: file name cannot be used in an item key"
                        );
                        dropped.push(DroppedItem {
                            category: category.name.clone(),
                            file_name: Some(file.name),
                            error: e,
                        });
                    }
                }
            }
        }

        let mut targets = Vec::with_capacity(by_key.len());
        for (key, mut candidates) in by_key {
            if candidates.len() > 1 {
                let keep = preferred_file(candidates.iter().map(|target| &target.file))
                    .map(|file| file.file.clone());
                tracing::debug!(
                    load_id = %load_id,
                    key = %key,
                    candidates = candidates.len(),
                    "Several files share a key; fetching the highest ranked"
                );
                candidates.retain(|target| Some(&target.file.file) == keep.as_ref());
                candidates.truncate(1);
            }
            targets.extend(candidates);
        }
        (targets, discovered)
    }

    /// Step 5: fetch every target's content concurrently.
    async fn fetch_contents(
        &self,
        store: &dyn CatalogStore,
        load_id: LoadId,
        targets: Vec<FetchTarget>,
        dropped: &mut Vec<DroppedItem>,
    ) -> Vec<Item> {
        let fetched: Vec<(FetchTarget, Result<String, StoreError>)> = stream::iter(targets)
            .map(|target| async move {
                let content = store.read_file_content(&target.file.file).await;
                (target, content)
            })
            .buffer_unordered(self.fetch_concurrency)
            .collect()
            .await;

        let mut items = Vec::with_capacity(fetched.len());
        for (target, content) in fetched {
            match content {
                Ok(content) => items.push(Item::from_file(
                    target.category,
                    &target.file.name,
                    content,
                    target.file.modified_at,
                )),
                Err(e) => {
                    tracing::warn!(
                        load_id = %load_id,
                        category = %target.category,
                        file = %target.file.name,
                        error = %e,
                        "Dropping item: content fetch failed"
                    );
                    dropped.push(DroppedItem {
                        category: target.category,
                        file_name: Some(target.file.name),
                        error: CatalogError::Transport(e),
                    });
                }
            }
        }
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::memory::InMemoryCatalogStore;
    use crate::store::StoreOperation;

    fn loader() -> CatalogLoader {
        CatalogLoader::new(
            &CatalogConfig::default(),
            Arc::new(ManualClock::starting_now()),
        )
    }

    fn keys(outcome: &LoadOutcome) -> Vec<String> {
        outcome
            .snapshot
            .items()
            .iter()
            .map(|item| item.key.clone())
            .collect()
    }

    #[tokio::test]
    async fn test_load_orders_items() {
        let store = InMemoryCatalogStore::new();
        let root = store.add_folder(None, "Tools");
        for category in ["B", "A"] {
            let folder = store.add_folder(Some(&root), category);
            store.add_file(&folder, "y.txt", "y");
            store.add_file(&folder, "x.txt", "x");
        }

        let outcome = loader().load(&store).await.unwrap();
        assert_eq!(keys(&outcome), vec!["A/x", "A/y", "B/x", "B/y"]);
        assert_eq!(outcome.report.categories_seen, 2);
        assert_eq!(outcome.report.files_discovered, 4);
        assert_eq!(outcome.report.files_shadowed, 0);
        assert!(!outcome.report.is_partial());
    }

    #[tokio::test]
    async fn test_missing_root_fails_load() {
        let store = InMemoryCatalogStore::new();
        store.add_folder(None, "Other");

        let err = loader().load(&store).await.unwrap_err();
        assert!(matches!(err, CatalogError::LoadFailed { .. }));
        assert!(matches!(err.root_cause(), CatalogError::RootNotFound { .. }));
    }

    #[tokio::test]
    async fn test_empty_root_fails_load() {
        let store = InMemoryCatalogStore::new();
        store.add_folder(None, "Tools");

        let err = loader().load(&store).await.unwrap_err();
        assert!(matches!(err.root_cause(), CatalogError::NoCategories { .. }));
        assert_eq!(store.calls(StoreOperation::ListFiles), 0);
    }

    #[tokio::test]
    async fn test_category_listing_transport_error_is_fatal() {
        let store = InMemoryCatalogStore::new();
        let root = store.add_folder(None, "Tools");
        store.add_folder(Some(&root), "A");
        store.fail_operation(
            StoreOperation::ListChildFolders,
            StoreError::Timeout {
                operation: "list_child_folders".to_string(),
                elapsed_ms: 30_000,
            },
        );

        let err = loader().load(&store).await.unwrap_err();
        assert!(matches!(
            err.root_cause(),
            CatalogError::Transport(StoreError::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_category_listing_is_dropped() {
        let store = InMemoryCatalogStore::new();
        let root = store.add_folder(None, "Tools");
        let a = store.add_folder(Some(&root), "A");
        let b = store.add_folder(Some(&root), "B");
        store.add_file(&a, "x.txt", "x");
        store.add_file(&b, "y.txt", "y");
        store.fail_files_of("B");

        let outcome = loader().load(&store).await.unwrap();
        assert_eq!(keys(&outcome), vec!["A/x"]);
        assert_eq!(outcome.report.dropped.len(), 1);
        assert_eq!(outcome.report.dropped[0].file_name, None);

        let categories: Vec<&str> = outcome
            .snapshot
            .categories()
            .iter()
            .map(String::as_str)
            .collect();
        assert_eq!(categories, vec!["A"]);
    }

    #[tokio::test]
    async fn test_empty_category_not_listed() {
        let store = InMemoryCatalogStore::new();
        let root = store.add_folder(None, "Tools");
        let a = store.add_folder(Some(&root), "A");
        store.add_folder(Some(&root), "Empty");
        store.add_file(&a, "x.txt", "x");

        let outcome = loader().load(&store).await.unwrap();
        assert_eq!(outcome.report.categories_seen, 2);
        assert_eq!(outcome.snapshot.categories().len(), 1);
    }

    #[tokio::test]
    async fn test_shared_stem_fetches_one_file() {
        let store = InMemoryCatalogStore::new();
        let root = store.add_folder(None, "Tools");
        let a = store.add_folder(Some(&root), "A");
        store.add_file(&a, "x.txt", "from x.txt");
        store.add_file(&a, "x.md", "from x.md");
        store.set_reverse_listings(true);

        let outcome = loader().load(&store).await.unwrap();
        assert_eq!(keys(&outcome), vec!["A/x"]);
        assert_eq!(outcome.snapshot.get("A/x").unwrap().content, "from x.md");
        assert_eq!(outcome.report.files_discovered, 2);
        assert_eq!(outcome.report.files_shadowed, 1);
        assert_eq!(store.calls(StoreOperation::ReadFileContent), 1);
    }

    #[tokio::test]
    async fn test_separator_in_names_is_dropped() {
        let store = InMemoryCatalogStore::new();
        let root = store.add_folder(None, "Tools");
        let a = store.add_folder(Some(&root), "A");
        let nested = store.add_folder(Some(&root), "Drafts/Old");
        store.add_file(&a, "x.txt", "x");
        store.add_file(&a, "a/b.txt", "nested");
        store.add_file(&nested, "y.txt", "y");

        let outcome = loader().load(&store).await.unwrap();
        assert_eq!(keys(&outcome), vec!["A/x"]);
        assert_eq!(store.calls(StoreOperation::ListFiles), 1);
        assert_eq!(store.calls(StoreOperation::ReadFileContent), 1);

        let mut dropped: Vec<(&str, Option<&str>)> = outcome
            .report
            .dropped
            .iter()
            .map(|d| (d.category.as_str(), d.file_name.as_deref()))
            .collect();
        dropped.sort();
        assert_eq!(dropped, vec![("A", Some("a/b.txt")), ("Drafts/Old", None)]);
        assert!(outcome
            .report
            .dropped
            .iter()
            .all(|d| matches!(d.error, CatalogError::InvalidKey { .. })));
    }

    #[tokio::test]
    async fn test_fetch_failure_is_reported_as_transport() {
        let store = InMemoryCatalogStore::new();
        let root = store.add_folder(None, "Tools");
        let a = store.add_folder(Some(&root), "A");
        store.add_file(&a, "x.txt", "x");
        store.fail_content_of("x.txt");

        let outcome = loader().load(&store).await.unwrap();
        assert!(outcome.snapshot.is_empty());
        assert!(matches!(
            outcome.report.dropped[0].error,
            CatalogError::Transport(_)
        ));
    }
}
