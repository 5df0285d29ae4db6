//! FOLIO Catalog - Remote Catalog Cache
//!
//! Keeps a per-principal, in-memory copy of a catalog stored as a folder
//! tree in a slow remote document store:
//!
//! ```text
//! <root folder>/<category>/<leaf>.<ext>
//! ```
//!
//! - [`CatalogLoader`] walks the whole tree once and assembles a snapshot.
//! - [`CatalogCache`] serves that snapshot until it expires, collapsing
//!   concurrent reloads into a single load.
//! - [`FallbackResolver`] looks up single items the snapshot is missing and
//!   the cache merges them in.
//! - [`CatalogRegistry`] keeps one cache per principal while letting the
//!   store handle be swapped on every request.
//!
//! The store itself sits behind the [`CatalogStore`] trait;
//! [`InMemoryCatalogStore`] implements it over an in-process tree.

pub mod cache;
pub mod fallback;
pub mod loader;
pub mod memory;
pub mod registry;
pub mod store;

pub use cache::{
    CacheRead, CacheStats, CatalogCache, Clock, ItemLookup, ManualClock, SystemClock,
};
pub use fallback::FallbackResolver;
pub use loader::{CatalogLoader, DroppedItem, LoadOutcome, LoadReport};
pub use memory::InMemoryCatalogStore;
pub use registry::{CatalogHandle, CatalogRegistry};
pub use store::{
    preferred_file, CatalogStore, FileEntry, FileRef, FolderEntry, FolderRef, StoreHandle,
    StoreOperation,
};
