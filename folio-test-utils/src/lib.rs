//! FOLIO Test Utilities
//!
//! Shared test infrastructure for the FOLIO workspace:
//! - Proptest generators for keys, names and catalog layouts
//! - Catalog fixtures built on the in-memory store
//! - Custom assertions for catalog error variants
//! - Tracing setup for tests

pub use folio_catalog::{
    CacheRead, CacheStats, CatalogCache, CatalogHandle, CatalogRegistry, CatalogStore, Clock,
    InMemoryCatalogStore, ItemLookup, ManualClock, StoreHandle, StoreOperation,
};
pub use folio_core::{
    CatalogConfig, CatalogError, CatalogListing, FolioError, FolioResult, Item, ItemKey,
    PrincipalId, StoreError, Timestamp,
};

use std::sync::{Arc, Once};

// ============================================================================
// TRACING
// ============================================================================

static TRACING: Once = Once::new();

/// Install a test-friendly tracing subscriber once per process.
///
/// Honors `RUST_LOG`; defaults to `warn`.
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for catalog names and layouts.

    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;
    use std::collections::{BTreeMap, BTreeSet};

    /// A category folder name.
    pub fn arb_category_name() -> impl Strategy<Value = String> {
        "[A-Z][a-z]{1,10}"
    }

    /// A leaf name as it appears in keys: lowercase words joined by `_`.
    pub fn arb_leaf_name() -> impl Strategy<Value = String> {
        "[a-z]{1,8}(_[a-z]{1,8}){0,2}"
    }

    /// A leaf file name with a `.txt` extension.
    pub fn arb_file_name() -> impl Strategy<Value = String> {
        arb_leaf_name().prop_map(|leaf| format!("{}.txt", leaf))
    }

    /// A well-formed `category/leaf` key.
    pub fn arb_item_key() -> impl Strategy<Value = String> {
        (arb_category_name(), arb_leaf_name())
            .prop_map(|(category, leaf)| ItemKey::compose(&category, &leaf))
    }

    /// A key that is not exactly two non-empty segments.
    pub fn arb_invalid_key() -> impl Strategy<Value = String> {
        prop_oneof![
            arb_leaf_name(),
            arb_leaf_name().prop_map(|leaf| format!("/{}", leaf)),
            arb_category_name().prop_map(|category| format!("{}/", category)),
            (arb_category_name(), arb_leaf_name(), arb_leaf_name())
                .prop_map(|(c, a, b)| format!("{}/{}/{}", c, a, b)),
            Just(String::new()),
            Just("/".to_string()),
        ]
    }

    /// A timestamp between 2020 and 2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
        })
    }

    /// A catalog layout: category name to leaf names, every category
    /// non-empty.
    pub fn arb_catalog_layout() -> impl Strategy<Value = BTreeMap<String, BTreeSet<String>>> {
        prop::collection::btree_map(
            arb_category_name(),
            prop::collection::btree_set(arb_leaf_name(), 1..5),
            1..5,
        )
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built catalogs for common testing scenarios.

    use super::*;
    use folio_core::DEFAULT_ROOT_FOLDER_NAME;

    /// Builder for an in-memory catalog tree.
    #[derive(Debug, Clone)]
    pub struct CatalogFixture {
        root: String,
        categories: Vec<(String, Vec<(String, String)>)>,
    }

    impl Default for CatalogFixture {
        fn default() -> Self {
            Self::new()
        }
    }

    impl CatalogFixture {
        /// An empty catalog under the default root folder.
        pub fn new() -> Self {
            Self {
                root: DEFAULT_ROOT_FOLDER_NAME.to_string(),
                categories: Vec::new(),
            }
        }

        pub fn with_root(mut self, root: impl Into<String>) -> Self {
            self.root = root.into();
            self
        }

        /// Add a category with `(file name, content)` pairs, in listing order.
        pub fn category(mut self, name: impl Into<String>, files: &[(&str, &str)]) -> Self {
            self.categories.push((
                name.into(),
                files
                    .iter()
                    .map(|(file, content)| (file.to_string(), content.to_string()))
                    .collect(),
            ));
            self
        }

        /// Materialize the tree in a fresh store.
        pub fn build(&self) -> Arc<InMemoryCatalogStore> {
            let store = Arc::new(InMemoryCatalogStore::new());
            let root = store.add_folder(None, self.root.clone());
            for (category, files) in &self.categories {
                let folder = store.add_folder(Some(&root), category.clone());
                for (file, content) in files {
                    store.add_file(&folder, file.clone(), content.clone());
                }
            }
            store
        }
    }

    /// Two categories of writing tools, listed out of order.
    pub fn writing_tools() -> CatalogFixture {
        CatalogFixture::new()
            .category(
                "Revision",
                &[
                    ("line_edit.txt", "Tighten every sentence."),
                    ("continuity_check.txt", "Flag contradictions."),
                ],
            )
            .category(
                "Drafting",
                &[
                    ("scene_builder.txt", "Sketch the scene beats."),
                    ("outline.txt", "Outline the chapter."),
                ],
            )
    }

    /// One category holding `count` leaves named `item_0.txt` onward.
    pub fn single_category(name: &str, count: usize) -> CatalogFixture {
        let files: Vec<(String, String)> = (0..count)
            .map(|i| (format!("item_{}.txt", i), format!("content {}", i)))
            .collect();
        let borrowed: Vec<(&str, &str)> = files
            .iter()
            .map(|(file, content)| (file.as_str(), content.as_str()))
            .collect();
        CatalogFixture::new().category(name, &borrowed)
    }

    /// A cache driven by a manual clock.
    pub fn manual_cache(config: &CatalogConfig) -> (CatalogCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let cache = CatalogCache::with_clock(config, clock.clone());
        (cache, clock)
    }

    /// Upcast a concrete store to a shared handle.
    pub fn handle(store: &Arc<InMemoryCatalogStore>) -> StoreHandle {
        store.clone()
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertion helpers for FOLIO error variants.

    use super::*;

    fn catalog_error<T: std::fmt::Debug>(result: &FolioResult<T>) -> &CatalogError {
        match result {
            Err(FolioError::Catalog(err)) => err,
            other => panic!("Expected Catalog error, got: {:?}", other),
        }
    }

    /// Assert that a FolioResult is an InvalidKey error.
    #[track_caller]
    pub fn assert_invalid_key<T: std::fmt::Debug>(result: &FolioResult<T>) {
        match catalog_error(result) {
            CatalogError::InvalidKey { .. } => {}
            other => panic!("Expected InvalidKey, got: {:?}", other),
        }
    }

    /// Assert that a FolioResult is a failed bulk load.
    #[track_caller]
    pub fn assert_load_failed<T: std::fmt::Debug>(result: &FolioResult<T>) {
        match catalog_error(result) {
            CatalogError::LoadFailed { .. } => {}
            other => panic!("Expected LoadFailed, got: {:?}", other),
        }
    }

    /// Assert that a FolioResult is a Config error.
    #[track_caller]
    pub fn assert_config_error<T: std::fmt::Debug>(result: &FolioResult<T>) {
        match result {
            Err(FolioError::Config(_)) => {}
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }

    /// Assert that listing keys appear in exactly this order.
    #[track_caller]
    pub fn assert_keys(listing: &CatalogListing, expected: &[&str]) {
        let keys: Vec<&str> = listing.items.iter().map(|item| item.key.as_str()).collect();
        assert_eq!(keys, expected, "Unexpected listing order");
    }
}
