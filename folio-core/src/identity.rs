//! Identity types for Folio catalog state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Identifier attached to a single bulk load, used to correlate log events.
/// UUIDv7 embeds a Unix timestamp, so load ids sort by start time.
pub type LoadId = Uuid;

/// Generate a new UUIDv7 load id.
pub fn new_load_id() -> LoadId {
    Uuid::now_v7()
}

/// Authenticated identity on whose behalf a catalog cache is maintained.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(String);

impl PrincipalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PrincipalId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for PrincipalId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_ids_are_time_ordered() {
        let first = new_load_id();
        let second = new_load_id();
        assert!(first <= second);
        assert_eq!(first.get_version_num(), 7);
    }

    #[test]
    fn test_principal_id_display_and_serde() {
        let id = PrincipalId::from("user-42");
        assert_eq!(id.to_string(), "user-42");
        assert_eq!(id.as_str(), "user-42");

        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"user-42\"");
    }
}
