//! FOLIO Core - Catalog Types
//!
//! Pure data structures shared by the catalog cache crates: items and keys,
//! snapshots, configuration and the error taxonomy. No I/O lives here.

pub mod config;
pub mod error;
pub mod identity;
pub mod item;
pub mod snapshot;

pub use config::{
    CatalogConfig, DEFAULT_CATALOG_TTL, DEFAULT_CONTENT_MIME_TYPE, DEFAULT_ROOT_FOLDER_NAME,
};
pub use error::{
    CatalogError, CatalogResult, ConfigError, FolioError, FolioResult, StoreError, StoreResult,
};
pub use identity::{new_load_id, LoadId, PrincipalId, Timestamp};
pub use item::{
    display_name_from_file, file_stem, is_valid_segment, CategoryName, Item, ItemKey, ItemSummary,
    KEY_SEPARATOR,
};
pub use snapshot::{CatalogListing, Snapshot, SnapshotInfo};
