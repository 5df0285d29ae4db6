//! Catalog items and item keys.

use crate::error::CatalogError;
use crate::identity::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between the category and leaf segments of an item key.
pub const KEY_SEPARATOR: char = '/';

/// A category name discovered from a folder in the store.
pub type CategoryName = String;

/// A fully loaded catalog item.
///
/// Items are produced either by a bulk load or by a fallback lookup and are
/// never partially constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub key: String,
    pub display_name: String,
    pub category: CategoryName,
    pub content: String,
    pub source_modified_at: Timestamp,
}

impl Item {
    /// Build an item from the name of the file it was read from.
    pub fn from_file(
        category: impl Into<CategoryName>,
        file_name: &str,
        content: String,
        source_modified_at: Timestamp,
    ) -> Self {
        let category = category.into();
        let key = ItemKey::compose(&category, file_stem(file_name));
        Self {
            key,
            display_name: display_name_from_file(file_name),
            category,
            content,
            source_modified_at,
        }
    }

    /// Metadata view of this item, without content.
    pub fn summary(&self) -> ItemSummary {
        ItemSummary {
            key: self.key.clone(),
            display_name: self.display_name.clone(),
            category: self.category.clone(),
            source_modified_at: self.source_modified_at,
        }
    }
}

/// Item metadata as presented in catalog listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSummary {
    pub key: String,
    pub display_name: String,
    pub category: CategoryName,
    pub source_modified_at: Timestamp,
}

impl ItemSummary {
    /// Presentation order: category, then display name, then key.
    pub fn sort_key(&self) -> (&str, &str, &str) {
        (&self.category, &self.display_name, &self.key)
    }
}

/// A parsed `category/leaf` item key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemKey {
    category: CategoryName,
    leaf: String,
}

impl ItemKey {
    /// Parse a key, requiring exactly two non-empty segments.
    pub fn parse(key: &str) -> Result<Self, CatalogError> {
        let invalid = |reason: &str| CatalogError::InvalidKey {
            key: key.to_string(),
            reason: reason.to_string(),
        };

        let mut segments = key.split(KEY_SEPARATOR);
        let (category, leaf) = match (segments.next(), segments.next(), segments.next()) {
            (Some(category), Some(leaf), None) => (category, leaf),
            (_, None, _) => return Err(invalid("expected category/leaf")),
            _ => return Err(invalid("too many segments")),
        };

        if category.is_empty() || leaf.is_empty() {
            return Err(invalid("empty segment"));
        }

        Ok(Self {
            category: category.to_string(),
            leaf: leaf.to_string(),
        })
    }

    /// Key of the item a store file would become, if the category folder
    /// and file names form a valid two-segment key.
    pub fn for_file(category: &str, file_name: &str) -> Result<Self, CatalogError> {
        Self::parse(&Self::compose(category, file_stem(file_name)))
    }

    /// Join a category and leaf name into the key wire form.
    pub fn compose(category: &str, leaf: &str) -> String {
        format!("{}{}{}", category, KEY_SEPARATOR, leaf)
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn leaf(&self) -> &str {
        &self.leaf
    }

    /// Whether a store file name refers to this key's leaf.
    pub fn matches_file(&self, file_name: &str) -> bool {
        file_stem(file_name) == self.leaf
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.category, KEY_SEPARATOR, self.leaf)
    }
}

/// Whether a folder or file stem can stand as one key segment.
pub fn is_valid_segment(name: &str) -> bool {
    !name.is_empty() && !name.contains(KEY_SEPARATOR)
}

/// File name without its final extension.
///
/// Dot-files such as `.notes` keep their full name.
pub fn file_stem(file_name: &str) -> &str {
    match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    }
}

/// Human-readable name for a leaf file: extension removed and
/// underscore-separated words title-cased.
///
/// `plot_hole_finder.txt` becomes `Plot Hole Finder`.
pub fn display_name_from_file(file_name: &str) -> String {
    file_stem(file_name)
        .split('_')
        .filter(|word| !word.is_empty())
        .map(title_case)
        .collect::<Vec<_>>()
        .join(" ")
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_display_name_derivation() {
        assert_eq!(display_name_from_file("plot_hole_finder.txt"), "Plot Hole Finder");
        assert_eq!(display_name_from_file("DIALOGUE_polish.md"), "Dialogue Polish");
        assert_eq!(display_name_from_file("x.txt"), "X");
        assert_eq!(display_name_from_file("double__underscore"), "Double Underscore");
        assert_eq!(display_name_from_file("archive.tar.gz"), "Archive.tar");
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("outline.txt"), "outline");
        assert_eq!(file_stem("no_extension"), "no_extension");
        assert_eq!(file_stem(".hidden"), ".hidden");
    }

    #[test]
    fn test_parse_valid_key() {
        let key = ItemKey::parse("Editing/line_edit").unwrap();
        assert_eq!(key.category(), "Editing");
        assert_eq!(key.leaf(), "line_edit");
        assert_eq!(key.to_string(), "Editing/line_edit");
        assert!(key.matches_file("line_edit.txt"));
        assert!(!key.matches_file("line_edit_v2.txt"));
    }

    #[test]
    fn test_parse_rejects_malformed_keys() {
        for bad in ["badkey", "", "/leaf", "category/", "a/b/c", "/"] {
            let err = ItemKey::parse(bad).unwrap_err();
            assert!(
                matches!(err, CatalogError::InvalidKey { ref key, .. } if key == bad),
                "expected InvalidKey for {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_key_for_file_rejects_separator_in_names() {
        let key = ItemKey::for_file("Drafting", "outline.txt").unwrap();
        assert_eq!(key.to_string(), "Drafting/outline");

        assert!(ItemKey::for_file("Drafts/Old", "outline.txt").is_err());
        assert!(ItemKey::for_file("Drafting", "a/b.txt").is_err());
        assert!(!is_valid_segment("Drafts/Old"));
        assert!(!is_valid_segment(""));
        assert!(is_valid_segment("Drafting"));
    }

    #[test]
    fn test_item_from_file() {
        let now = Utc::now();
        let item = Item::from_file("Drafting", "scene_builder.txt", "body".to_string(), now);
        assert_eq!(item.key, "Drafting/scene_builder");
        assert_eq!(item.display_name, "Scene Builder");
        assert_eq!(item.category, "Drafting");

        let summary = item.summary();
        assert_eq!(summary.key, item.key);
        assert_eq!(summary.source_modified_at, now);
    }

    mod props {
        use super::super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(100))]

            /// Any composed key with non-empty, separator-free segments parses
            /// back into the same segments.
            #[test]
            fn prop_compose_then_parse(
                category in "[A-Za-z0-9 _-]{1,16}",
                leaf in "[A-Za-z0-9 _.-]{1,16}",
            ) {
                let key = ItemKey::compose(&category, &leaf);
                let parsed = ItemKey::parse(&key).unwrap();
                prop_assert_eq!(parsed.category(), category.as_str());
                prop_assert_eq!(parsed.leaf(), leaf.as_str());
            }

            /// Keys without a separator are always rejected.
            #[test]
            fn prop_separator_free_keys_rejected(key in "[A-Za-z0-9_.-]{0,24}") {
                prop_assert!(ItemKey::parse(&key).is_err());
            }
        }
    }
}
