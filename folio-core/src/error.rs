//! Error types for Folio catalog operations

use thiserror::Error;

/// Failures raised by a catalog store adapter.
///
/// These are transport-level failures and are distinct from "not found",
/// which adapters report as `None` or an empty listing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store call {operation} failed: {reason}")]
    Transport { operation: String, reason: String },

    #[error("Store credentials rejected during {operation}")]
    Unauthorized { operation: String },

    #[error("Rate limited during {operation}, retry after {retry_after_ms}ms")]
    RateLimited {
        operation: String,
        retry_after_ms: i64,
    },

    #[error("Store call {operation} timed out after {elapsed_ms}ms")]
    Timeout { operation: String, elapsed_ms: i64 },
}

impl StoreError {
    /// Name of the adapter operation that failed.
    pub fn operation(&self) -> &str {
        match self {
            Self::Transport { operation, .. }
            | Self::Unauthorized { operation }
            | Self::RateLimited { operation, .. }
            | Self::Timeout { operation, .. } => operation,
        }
    }
}

/// Catalog cache errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Catalog root folder not found: {name}")]
    RootNotFound { name: String },

    #[error("Catalog root {root} has no category folders")]
    NoCategories { root: String },

    #[error("Invalid item key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("Item not found: {key}")]
    NotFound { key: String },

    #[error("Transport error: {0}")]
    Transport(#[from] StoreError),

    #[error("Catalog load failed: {source}")]
    LoadFailed {
        #[source]
        source: Box<CatalogError>,
    },
}

impl CatalogError {
    /// Wrap a cause as `LoadFailed`, without nesting an existing `LoadFailed`.
    pub fn load_failed(cause: CatalogError) -> Self {
        match cause {
            Self::LoadFailed { .. } => cause,
            other => Self::LoadFailed {
                source: Box::new(other),
            },
        }
    }

    /// The innermost cause of a `LoadFailed`, or `self` for other variants.
    pub fn root_cause(&self) -> &CatalogError {
        match self {
            Self::LoadFailed { source } => source.root_cause(),
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all Folio errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FolioError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl From<StoreError> for FolioError {
    fn from(err: StoreError) -> Self {
        FolioError::Catalog(CatalogError::Transport(err))
    }
}

impl FolioError {
    /// Whether repeating the same call may succeed.
    ///
    /// A failed load leaves no in-flight state behind, so the next call starts
    /// a fresh load. Malformed keys and bad configuration never heal on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            FolioError::Catalog(err) => matches!(
                err.root_cause(),
                CatalogError::Transport(_)
                    | CatalogError::RootNotFound { .. }
                    | CatalogError::NoCategories { .. }
            ),
            FolioError::Config(_) => false,
        }
    }

    /// Borrow the catalog error, if this is one.
    pub fn as_catalog(&self) -> Option<&CatalogError> {
        match self {
            FolioError::Catalog(err) => Some(err),
            FolioError::Config(_) => None,
        }
    }
}

/// Result type alias for Folio operations.
pub type FolioResult<T> = Result<T, FolioError>;

/// Result type alias for catalog-level operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Result type alias for store adapter calls.
pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// TESTS
// =============================================================================
