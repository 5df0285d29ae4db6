//! Catalog store adapter trait.
//!
//! The store is the remote document backend holding the catalog folder tree.
//! Every call may be slow and may fail transiently; "not found" is reported
//! as `None` or an empty listing, never as an error.

use async_trait::async_trait;
use folio_core::{StoreResult, Timestamp};
use std::cmp::Reverse;
use std::fmt;
use std::sync::Arc;

/// Opaque reference to a folder, assigned by the backing store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FolderRef(String);

/// Opaque reference to a file, assigned by the backing store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileRef(String);

impl FolderRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FileRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FolderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A child folder returned by [`CatalogStore::list_child_folders`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderEntry {
    pub folder: FolderRef,
    pub name: String,
}

/// A file returned by [`CatalogStore::list_files`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub file: FileRef,
    pub name: String,
    pub modified_at: Timestamp,
}

impl FileEntry {
    /// Rank among files that map to the same item key: lowest file name,
    /// then most recently modified, then file reference.
    pub fn precedence(&self) -> (&str, Reverse<Timestamp>, &str) {
        (&self.name, Reverse(self.modified_at), self.file.as_str())
    }
}

/// The file that stands for an item key when several files share its stem.
///
/// Depends only on the entries themselves, never on listing or completion
/// order.
pub fn preferred_file<'a, I>(candidates: I) -> Option<&'a FileEntry>
where
    I: IntoIterator<Item = &'a FileEntry>,
{
    candidates
        .into_iter()
        .min_by(|a, b| a.precedence().cmp(&b.precedence()))
}

/// The adapter operations, used for error reporting and call accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    FindFolder,
    ListChildFolders,
    ListFiles,
    ReadFileContent,
}

impl StoreOperation {
    pub const ALL: [StoreOperation; 4] = [
        StoreOperation::FindFolder,
        StoreOperation::ListChildFolders,
        StoreOperation::ListFiles,
        StoreOperation::ReadFileContent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreOperation::FindFolder => "find_folder",
            StoreOperation::ListChildFolders => "list_child_folders",
            StoreOperation::ListFiles => "list_files",
            StoreOperation::ReadFileContent => "read_file_content",
        }
    }
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remote document store holding the catalog.
///
/// Implementations receive already-authenticated credentials. Callers never
/// retry on their behalf; retry policy belongs to the adapter.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Find a folder by name directly under `parent`, or under the store root
    /// when `parent` is `None`.
    async fn find_folder(
        &self,
        parent: Option<&FolderRef>,
        name: &str,
    ) -> StoreResult<Option<FolderRef>>;

    /// List the immediate child folders of `parent`.
    async fn list_child_folders(&self, parent: &FolderRef) -> StoreResult<Vec<FolderEntry>>;

    /// List the files directly under `parent` whose mime type is `mime_filter`.
    async fn list_files(&self, parent: &FolderRef, mime_filter: &str)
        -> StoreResult<Vec<FileEntry>>;

    /// Read the full content of a file.
    async fn read_file_content(&self, file: &FileRef) -> StoreResult<String>;
}

/// Shared, swappable handle to a store.
///
/// Credentials behind a handle expire; the registry replaces the handle
/// without touching cached catalog state.
pub type StoreHandle = Arc<dyn CatalogStore>;
