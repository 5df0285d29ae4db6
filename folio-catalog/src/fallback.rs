//! Point lookups for items missing from the bulk snapshot.
//!
//! A snapshot can lag a store that gained items after the last load, or miss
//! an item whose fetch failed during the load. The resolver walks the same
//! root → category → leaf path as the loader, scoped to one key.

use folio_core::{CatalogConfig, CatalogError, CatalogResult, Item, ItemKey};

use crate::store::{preferred_file, CatalogStore};

/// Resolves single items directly against the store.
#[derive(Debug, Clone)]
pub struct FallbackResolver {
    root_folder_name: String,
    content_mime_type: String,
}

impl FallbackResolver {
    pub fn new(config: &CatalogConfig) -> Self {
        Self {
            root_folder_name: config.root_folder_name.clone(),
            content_mime_type: config.content_mime_type.clone(),
        }
    }

    /// Resolve a raw key. Fails with `InvalidKey` before touching the store
    /// if the key is malformed.
    pub async fn resolve_one(&self, store: &dyn CatalogStore, key: &str) -> CatalogResult<Item> {
        let key = ItemKey::parse(key)?;
        self.resolve_key(store, &key).await
    }

    /// Resolve a parsed key.
    ///
    /// Returns `NotFound` as soon as the root, the category folder or the
    /// leaf file is missing. Store failures surface as `Transport`. Among
    /// files sharing the key's stem, picks the same one a bulk load would.
    pub async fn resolve_key(&self, store: &dyn CatalogStore, key: &ItemKey) -> CatalogResult<Item> {
        let not_found = || CatalogError::NotFound {
            key: key.to_string(),
        };

        let root = store
            .find_folder(None, &self.root_folder_name)
            .await?
            .ok_or_else(not_found)?;

        let category = store
            .find_folder(Some(&root), key.category())
            .await?
            .ok_or_else(not_found)?;

        let files = store
            .list_files(&category, &self.content_mime_type)
            .await?;
        let file = preferred_file(files.iter().filter(|file| key.matches_file(&file.name)))
            .ok_or_else(not_found)?;

        let content = store.read_file_content(&file.file).await?;

        Ok(Item::from_file(
            key.category(),
            &file.name,
            content,
            file.modified_at,
        ))
    }
}
