//! core::block
//!
//! Block entry names as yielded by bucket enumeration.
//!
//! A block lives under a directory-like key prefix that ends in exactly one
//! `/`, e.g. `01ABC/` or `tenant-a/01ABC/` when listing under a prefix.
//! [`BlockEntry`] is the validated form of such a name.

use thiserror::Error;

use super::meta::META_FILENAME;

/// Separator between key components in object names.
pub const SEPARATOR: char = '/';

/// Errors from entry name validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryError {
    #[error("entry '{0}' is not a block directory: missing trailing '/'")]
    NotADirectory(String),

    #[error("entry name is empty")]
    Empty,
}

/// A block directory entry found during enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockEntry {
    /// Entry name with its single trailing separator removed
    name: String,
}

impl BlockEntry {
    /// Validate an enumerated entry name.
    ///
    /// Exactly one trailing separator is removed. Entries without one are
    /// objects, not block directories, and are rejected rather than truncated.
    ///
    /// # Example
    ///
    /// ```
    /// use blockscope::core::block::BlockEntry;
    ///
    /// let entry = BlockEntry::parse("tenant/01ABC/").unwrap();
    /// assert_eq!(entry.display_name(), "tenant/01ABC");
    /// assert_eq!(entry.id(), "01ABC");
    /// assert_eq!(entry.meta_path(), "tenant/01ABC/meta.json");
    ///
    /// assert!(BlockEntry::parse("debug.txt").is_err());
    /// ```
    pub fn parse(entry: &str) -> Result<Self, EntryError> {
        let name = entry
            .strip_suffix(SEPARATOR)
            .ok_or_else(|| EntryError::NotADirectory(entry.to_string()))?;
        if name.is_empty() {
            return Err(EntryError::Empty);
        }
        Ok(Self {
            name: name.to_string(),
        })
    }

    /// The entry name as printed in name-only output.
    pub fn display_name(&self) -> &str {
        &self.name
    }

    /// The block identifier: the last component of the entry name.
    pub fn id(&self) -> &str {
        match self.name.rfind(SEPARATOR) {
            Some(idx) => &self.name[idx + 1..],
            None => &self.name,
        }
    }

    /// Object path of the block's metadata document.
    pub fn meta_path(&self) -> String {
        join(&self.name, META_FILENAME)
    }
}

impl std::fmt::Display for BlockEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Join a directory key and a child name with a single separator.
pub fn join(dir: &str, child: &str) -> String {
    let dir = dir.trim_end_matches(SEPARATOR);
    if dir.is_empty() {
        child.to_string()
    } else {
        format!("{}{}{}", dir, SEPARATOR, child)
    }
}

/// Normalize a listing prefix.
///
/// The empty prefix means the bucket root. Any other prefix is made relative
/// (no leading separator) and given exactly one trailing separator.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches(SEPARATOR);
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}{}", trimmed, SEPARATOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod parse {
        use super::*;

        #[test]
        fn strips_one_trailing_separator() {
            let entry = BlockEntry::parse("01ABC/").unwrap();
            assert_eq!(entry.display_name(), "01ABC");
            assert_eq!(entry.id(), "01ABC");
        }

        #[test]
        fn strips_only_one_separator() {
            let entry = BlockEntry::parse("01ABC//").unwrap();
            assert_eq!(entry.display_name(), "01ABC/");
        }

        #[test]
        fn nested_entry_id_is_last_component() {
            let entry = BlockEntry::parse("a/b/01DEF/").unwrap();
            assert_eq!(entry.display_name(), "a/b/01DEF");
            assert_eq!(entry.id(), "01DEF");
        }

        #[test]
        fn object_entry_rejected() {
            assert_eq!(
                BlockEntry::parse("01ABC"),
                Err(EntryError::NotADirectory("01ABC".into()))
            );
        }

        #[test]
        fn bare_separator_rejected() {
            assert_eq!(BlockEntry::parse("/"), Err(EntryError::Empty));
            assert!(BlockEntry::parse("").is_err());
        }

        #[test]
        fn display_matches_name() {
            let entry = BlockEntry::parse("01ABC/").unwrap();
            assert_eq!(format!("{}", entry), "01ABC");
        }
    }

    mod paths {
        use super::*;

        #[test]
        fn meta_path() {
            let entry = BlockEntry::parse("01ABC/").unwrap();
            assert_eq!(entry.meta_path(), "01ABC/meta.json");
        }

        #[test]
        fn join_handles_separators() {
            assert_eq!(join("a", "b"), "a/b");
            assert_eq!(join("a/", "b"), "a/b");
            assert_eq!(join("", "b"), "b");
        }

        #[test]
        fn normalize_prefix_variants() {
            assert_eq!(normalize_prefix(""), "");
            assert_eq!(normalize_prefix("/"), "");
            assert_eq!(normalize_prefix("tenant"), "tenant/");
            assert_eq!(normalize_prefix("tenant/"), "tenant/");
            assert_eq!(normalize_prefix("/tenant/a/"), "tenant/a/");
        }
    }
}
