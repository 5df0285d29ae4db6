//! Configuration types

use crate::error::{ConfigError, FolioError, FolioResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default name of the folder holding the catalog's category folders.
pub const DEFAULT_ROOT_FOLDER_NAME: &str = "Tools";

/// Default mime type of catalog leaf files.
pub const DEFAULT_CONTENT_MIME_TYPE: &str = "text/plain";

/// Default snapshot lifetime: one bulk load per interactive session, short
/// enough for out-of-band edits to surface promptly.
pub const DEFAULT_CATALOG_TTL: Duration = Duration::from_secs(10 * 60);

/// Catalog cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Well-known name of the catalog root folder under the store root.
    pub root_folder_name: String,
    /// Mime type used to filter leaf files during listing.
    pub content_mime_type: String,
    /// How long a published snapshot stays valid.
    pub ttl: Duration,
    /// Maximum number of concurrent store calls issued by one load.
    pub fetch_concurrency: usize,
    /// Maximum number of principals tracked by a registry.
    pub max_principals: usize,
    /// Registry entries not accessed for this long are evicted by
    /// `evict_idle`.
    pub principal_idle_ttl: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            root_folder_name: DEFAULT_ROOT_FOLDER_NAME.to_string(),
            content_mime_type: DEFAULT_CONTENT_MIME_TYPE.to_string(),
            ttl: DEFAULT_CATALOG_TTL,
            fetch_concurrency: 8,
            max_principals: 1024,
            principal_idle_ttl: Duration::from_secs(3600), // 1 hour
        }
    }
}

impl CatalogConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `FOLIO_CATALOG_ROOT`: Catalog root folder name (default: "Tools")
    /// - `FOLIO_CONTENT_MIME`: Leaf file mime type (default: "text/plain")
    /// - `FOLIO_CATALOG_TTL_SECS`: Snapshot lifetime in seconds (default: 600)
    /// - `FOLIO_FETCH_CONCURRENCY`: Concurrent store calls per load (default: 8)
    /// - `FOLIO_MAX_PRINCIPALS`: Registry capacity (default: 1024)
    /// - `FOLIO_PRINCIPAL_IDLE_SECS`: Idle eviction threshold (default: 3600)
    ///
    /// Unparseable values fall back to the default; call [`validate`] to
    /// reject values that parse but make no sense.
    ///
    /// [`validate`]: CatalogConfig::validate
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Self {
            root_folder_name: lookup("FOLIO_CATALOG_ROOT")
                .map(|s| s.trim().to_string())
                .unwrap_or(defaults.root_folder_name),
            content_mime_type: lookup("FOLIO_CONTENT_MIME")
                .map(|s| s.trim().to_string())
                .unwrap_or(defaults.content_mime_type),
            ttl: lookup("FOLIO_CATALOG_TTL_SECS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.ttl),
            fetch_concurrency: lookup("FOLIO_FETCH_CONCURRENCY")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.fetch_concurrency),
            max_principals: lookup("FOLIO_MAX_PRINCIPALS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_principals),
            principal_idle_ttl: lookup("FOLIO_PRINCIPAL_IDLE_SECS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.principal_idle_ttl),
        }
    }

    /// Set the catalog root folder name.
    pub fn with_root_folder(mut self, name: impl Into<String>) -> Self {
        self.root_folder_name = name.into();
        self
    }

    /// Set the leaf file mime type.
    pub fn with_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.content_mime_type = mime.into();
        self
    }

    /// Set the snapshot TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the per-load fetch concurrency.
    pub fn with_fetch_concurrency(mut self, concurrency: usize) -> Self {
        self.fetch_concurrency = concurrency;
        self
    }

    /// Set the registry capacity.
    pub fn with_max_principals(mut self, max: usize) -> Self {
        self.max_principals = max;
        self
    }

    /// Set the registry idle eviction threshold.
    pub fn with_principal_idle_ttl(mut self, ttl: Duration) -> Self {
        self.principal_idle_ttl = ttl;
        self
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - root_folder_name and content_mime_type are non-empty
    /// - ttl and principal_idle_ttl are positive
    /// - fetch_concurrency and max_principals are at least 1
    pub fn validate(&self) -> FolioResult<()> {
        if self.root_folder_name.trim().is_empty() {
            return Err(FolioError::Config(ConfigError::MissingRequired {
                field: "root_folder_name".to_string(),
            }));
        }

        if self.content_mime_type.trim().is_empty() {
            return Err(FolioError::Config(ConfigError::MissingRequired {
                field: "content_mime_type".to_string(),
            }));
        }

        if self.ttl.is_zero() {
            return Err(FolioError::Config(ConfigError::InvalidValue {
                field: "ttl".to_string(),
                value: format!("{:?}", self.ttl),
                reason: "ttl must be positive".to_string(),
            }));
        }

        if self.fetch_concurrency == 0 {
            return Err(FolioError::Config(ConfigError::InvalidValue {
                field: "fetch_concurrency".to_string(),
                value: self.fetch_concurrency.to_string(),
                reason: "fetch_concurrency must be at least 1".to_string(),
            }));
        }

        if self.max_principals == 0 {
            return Err(FolioError::Config(ConfigError::InvalidValue {
                field: "max_principals".to_string(),
                value: self.max_principals.to_string(),
                reason: "max_principals must be at least 1".to_string(),
            }));
        }

        if self.principal_idle_ttl.is_zero() {
            return Err(FolioError::Config(ConfigError::InvalidValue {
                field: "principal_idle_ttl".to_string(),
                value: format!("{:?}", self.principal_idle_ttl),
                reason: "principal_idle_ttl must be positive".to_string(),
            }));
        }

        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
