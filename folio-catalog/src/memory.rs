//! In-memory catalog store.
//!
//! A complete [`CatalogStore`] over an in-process folder tree, with call
//! counters, fault injection and artificial latency. Used by the test suites
//! and for running the cache without a remote backend.

use async_trait::async_trait;
use chrono::Utc;
use folio_core::{StoreError, StoreResult, Timestamp};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use crate::store::{
    CatalogStore, FileEntry, FileRef, FolderEntry, FolderRef, StoreOperation,
};

#[derive(Debug, Clone)]
struct FolderNode {
    name: String,
    parent: Option<FolderRef>,
}

#[derive(Debug, Clone)]
struct FileNode {
    name: String,
    parent: FolderRef,
    mime_type: String,
    content: String,
    modified_at: Timestamp,
}

#[derive(Debug, Default)]
struct Tree {
    /// Folders in creation order.
    folders: Vec<(FolderRef, FolderNode)>,
    /// Files in creation order.
    files: Vec<(FileRef, FileNode)>,
}

#[derive(Debug, Default)]
struct Faults {
    /// Every call of these operations fails.
    operations: HashMap<StoreOperation, StoreError>,
    /// Content reads of files with these names fail.
    content_of: HashSet<String>,
    /// File listings of folders with these names fail.
    files_of: HashSet<String>,
    /// Extra latency before answering a content read, by file name.
    content_delay: HashMap<String, Duration>,
    /// Latency applied to every call.
    latency: Option<Duration>,
    /// Return listings in reverse creation order.
    reverse_listings: bool,
}

#[derive(Debug, Default)]
struct CallCounters {
    find_folder: AtomicUsize,
    list_child_folders: AtomicUsize,
    list_files: AtomicUsize,
    read_file_content: AtomicUsize,
}

impl CallCounters {
    fn counter(&self, op: StoreOperation) -> &AtomicUsize {
        match op {
            StoreOperation::FindFolder => &self.find_folder,
            StoreOperation::ListChildFolders => &self.list_child_folders,
            StoreOperation::ListFiles => &self.list_files,
            StoreOperation::ReadFileContent => &self.read_file_content,
        }
    }
}

/// In-memory catalog store.
#[derive(Debug, Default)]
pub struct InMemoryCatalogStore {
    tree: RwLock<Tree>,
    faults: RwLock<Faults>,
    calls: CallCounters,
    next_id: AtomicU64,
}

impl InMemoryCatalogStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn tree(&self) -> RwLockReadGuard<'_, Tree> {
        self.tree.read().unwrap_or_else(|e| e.into_inner())
    }

    fn tree_mut(&self) -> RwLockWriteGuard<'_, Tree> {
        self.tree.write().unwrap_or_else(|e| e.into_inner())
    }

    fn faults(&self) -> RwLockReadGuard<'_, Faults> {
        self.faults.read().unwrap_or_else(|e| e.into_inner())
    }

    fn faults_mut(&self) -> RwLockWriteGuard<'_, Faults> {
        self.faults.write().unwrap_or_else(|e| e.into_inner())
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    // ========================================================================
    // TREE MUTATION
    // ========================================================================

    /// Add a folder under `parent`, or at the store root.
    pub fn add_folder(&self, parent: Option<&FolderRef>, name: impl Into<String>) -> FolderRef {
        let folder = FolderRef::new(self.next_id("folder"));
        self.tree_mut().folders.push((
            folder.clone(),
            FolderNode {
                name: name.into(),
                parent: parent.cloned(),
            },
        ));
        folder
    }

    /// Add a file with an explicit mime type and modification time.
    pub fn add_file_with(
        &self,
        parent: &FolderRef,
        name: impl Into<String>,
        mime_type: impl Into<String>,
        content: impl Into<String>,
        modified_at: Timestamp,
    ) -> FileRef {
        let file = FileRef::new(self.next_id("file"));
        self.tree_mut().files.push((
            file.clone(),
            FileNode {
                name: name.into(),
                parent: parent.clone(),
                mime_type: mime_type.into(),
                content: content.into(),
                modified_at,
            },
        ));
        file
    }

    /// Add a plain-text file modified now.
    pub fn add_file(
        &self,
        parent: &FolderRef,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> FileRef {
        self.add_file_with(
            parent,
            name,
            folio_core::DEFAULT_CONTENT_MIME_TYPE,
            content,
            Utc::now(),
        )
    }

    /// Replace a file's content. Returns false if the file does not exist.
    pub fn update_content(&self, file: &FileRef, content: impl Into<String>) -> bool {
        let mut tree = self.tree_mut();
        match tree.files.iter_mut().find(|(id, _)| id == file) {
            Some((_, node)) => {
                node.content = content.into();
                node.modified_at = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Remove a file. Returns false if the file does not exist.
    pub fn remove_file(&self, file: &FileRef) -> bool {
        let mut tree = self.tree_mut();
        let before = tree.files.len();
        tree.files.retain(|(id, _)| id != file);
        tree.files.len() != before
    }

    /// Number of files in the store.
    pub fn file_count(&self) -> usize {
        self.tree().files.len()
    }

    // ========================================================================
    // FAULT INJECTION
    // ========================================================================

    /// Fail every call of `op` with `error`.
    pub fn fail_operation(&self, op: StoreOperation, error: StoreError) {
        self.faults_mut().operations.insert(op, error);
    }

    /// Fail content reads of files named `file_name`.
    pub fn fail_content_of(&self, file_name: impl Into<String>) {
        self.faults_mut().content_of.insert(file_name.into());
    }

    /// Fail file listings of folders named `folder_name`.
    pub fn fail_files_of(&self, folder_name: impl Into<String>) {
        self.faults_mut().files_of.insert(folder_name.into());
    }

    /// Delay content reads of files named `file_name`.
    pub fn delay_content_of(&self, file_name: impl Into<String>, delay: Duration) {
        self.faults_mut().content_delay.insert(file_name.into(), delay);
    }

    /// Apply `latency` to every call.
    pub fn set_latency(&self, latency: Duration) {
        self.faults_mut().latency = Some(latency);
    }

    /// Answer listings in reverse creation order.
    pub fn set_reverse_listings(&self, reverse: bool) {
        self.faults_mut().reverse_listings = reverse;
    }

    /// Remove all injected faults and latency.
    pub fn clear_faults(&self) {
        *self.faults_mut() = Faults::default();
    }

    // ========================================================================
    // CALL ACCOUNTING
    // ========================================================================

    /// Number of calls made to `op`.
    pub fn calls(&self, op: StoreOperation) -> usize {
        self.calls.counter(op).load(Ordering::SeqCst)
    }

    /// Number of calls made to all operations.
    pub fn total_calls(&self) -> usize {
        StoreOperation::ALL.iter().map(|op| self.calls(*op)).sum()
    }

    /// Reset all call counters to zero.
    pub fn reset_calls(&self) {
        for op in StoreOperation::ALL {
            self.calls.counter(op).store(0, Ordering::SeqCst);
        }
    }

    /// Count the call, then apply latency and operation-wide faults.
    async fn enter(&self, op: StoreOperation) -> StoreResult<()> {
        self.calls.counter(op).fetch_add(1, Ordering::SeqCst);

        let (latency, failure) = {
            let faults = self.faults();
            (faults.latency, faults.operations.get(&op).cloned())
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn ordered<T>(&self, mut items: Vec<T>) -> Vec<T> {
        if self.faults().reverse_listings {
            items.reverse();
        }
        items
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn find_folder(
        &self,
        parent: Option<&FolderRef>,
        name: &str,
    ) -> StoreResult<Option<FolderRef>> {
        self.enter(StoreOperation::FindFolder).await?;

        let tree = self.tree();
        Ok(tree
            .folders
            .iter()
            .find(|(_, node)| node.parent.as_ref() == parent && node.name == name)
            .map(|(id, _)| id.clone()))
    }

    async fn list_child_folders(&self, parent: &FolderRef) -> StoreResult<Vec<FolderEntry>> {
        self.enter(StoreOperation::ListChildFolders).await?;

        let children: Vec<FolderEntry> = self
            .tree()
            .folders
            .iter()
            .filter(|(_, node)| node.parent.as_ref() == Some(parent))
            .map(|(id, node)| FolderEntry {
                folder: id.clone(),
                name: node.name.clone(),
            })
            .collect();
        Ok(self.ordered(children))
    }

    async fn list_files(
        &self,
        parent: &FolderRef,
        mime_filter: &str,
    ) -> StoreResult<Vec<FileEntry>> {
        self.enter(StoreOperation::ListFiles).await?;

        let files: Vec<FileEntry> = {
            let tree = self.tree();
            let folder_name = tree
                .folders
                .iter()
                .find(|(id, _)| id == parent)
                .map(|(_, node)| node.name.clone());

            if let Some(name) = folder_name {
                if self.faults().files_of.contains(&name) {
                    return Err(StoreError::Transport {
                        operation: StoreOperation::ListFiles.to_string(),
                        reason: format!("listing of folder {} failed", name),
                    });
                }
            }

            tree.files
                .iter()
                .filter(|(_, node)| &node.parent == parent && node.mime_type == mime_filter)
                .map(|(id, node)| FileEntry {
                    file: id.clone(),
                    name: node.name.clone(),
                    modified_at: node.modified_at,
                })
                .collect()
        };
        Ok(self.ordered(files))
    }

    async fn read_file_content(&self, file: &FileRef) -> StoreResult<String> {
        self.enter(StoreOperation::ReadFileContent).await?;

        let node = self
            .tree()
            .files
            .iter()
            .find(|(id, _)| id == file)
            .map(|(_, node)| node.clone())
            .ok_or_else(|| StoreError::Transport {
                operation: StoreOperation::ReadFileContent.to_string(),
                reason: format!("file {} does not exist", file),
            })?;

        let (delay, failing) = {
            let faults = self.faults();
            (
                faults.content_delay.get(&node.name).copied(),
                faults.content_of.contains(&node.name),
            )
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if failing {
            return Err(StoreError::Transport {
                operation: StoreOperation::ReadFileContent.to_string(),
                reason: format!("read of {} failed", node.name),
            });
        }

        Ok(node.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_find_folder_respects_parent() {
        let store = InMemoryCatalogStore::new();
        let root = store.add_folder(None, "Tools");
        let nested = store.add_folder(Some(&root), "Tools");

        assert_eq!(store.find_folder(None, "Tools").await.unwrap(), Some(root.clone()));
        assert_eq!(
            store.find_folder(Some(&root), "Tools").await.unwrap(),
            Some(nested)
        );
        assert_eq!(store.find_folder(None, "Missing").await.unwrap(), None);
        assert_eq!(store.calls(StoreOperation::FindFolder), 3);
    }

    #[tokio::test]
    async fn test_list_files_filters_mime() {
        let store = InMemoryCatalogStore::new();
        let folder = store.add_folder(None, "Drafting");
        store.add_file(&folder, "outline.txt", "outline");
        store.add_file_with(&folder, "cover.png", "image/png", "", Utc::now());

        let files = store.list_files(&folder, "text/plain").await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "outline.txt");
    }

    #[tokio::test]
    async fn test_reverse_listings() {
        let store = InMemoryCatalogStore::new();
        let root = store.add_folder(None, "Tools");
        store.add_folder(Some(&root), "A");
        store.add_folder(Some(&root), "B");
        store.set_reverse_listings(true);

        let names: Vec<String> = store
            .list_child_folders(&root)
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.name)
            .collect();
        assert_eq!(names, vec!["B", "A"]);
    }

    #[tokio::test]
    async fn test_injected_faults() {
        let store = InMemoryCatalogStore::new();
        let folder = store.add_folder(None, "Drafting");
        let file = store.add_file(&folder, "outline.txt", "outline");

        store.fail_content_of("outline.txt");
        assert!(store.read_file_content(&file).await.is_err());

        store.clear_faults();
        assert_eq!(store.read_file_content(&file).await.unwrap(), "outline");

        store.fail_operation(
            StoreOperation::FindFolder,
            StoreError::Unauthorized {
                operation: "find_folder".to_string(),
            },
        );
        assert!(matches!(
            store.find_folder(None, "Drafting").await,
            Err(StoreError::Unauthorized { .. })
        ));
        assert_eq!(store.total_calls(), 3);

        store.reset_calls();
        assert_eq!(store.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_update_and_remove() {
        let store = InMemoryCatalogStore::new();
        let folder = store.add_folder(None, "Drafting");
        let file = store.add_file(&folder, "outline.txt", "v1");

        assert!(store.update_content(&file, "v2"));
        assert_eq!(store.read_file_content(&file).await.unwrap(), "v2");

        assert!(store.remove_file(&file));
        assert!(!store.remove_file(&file));
        assert_eq!(store.file_count(), 0);
    }
}
