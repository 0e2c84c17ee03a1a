//! ImageNet class-name table.
//!
//! The table is a JSON array of exactly [`IMAGENET_CLASSES`] strings, index `i` naming
//! class `i` of the surrogate classifier.

use std::path::Path;

use crate::error::{AdvIoError, Result};

/// Number of classes a label table must contain.
pub const IMAGENET_CLASSES: usize = 1000;

/// Ordered class names.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelTable {
    labels: Vec<String>,
}

impl LabelTable {
    /// Parse a table from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let labels: Vec<String> = serde_json::from_str(json)?;
        Self::from_labels(labels)
    }

    /// Wrap an in-memory list, checking its length.
    pub fn from_labels(labels: Vec<String>) -> Result<Self> {
        if labels.len() != IMAGENET_CLASSES {
            return Err(AdvIoError::LabelCount {
                expected: IMAGENET_CLASSES,
                got: labels.len(),
            });
        }
        Ok(Self { labels })
    }

    /// Load a table from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(AdvIoError::MissingFile {
                path: path.display().to_string(),
            });
        }
        let text = std::fs::read_to_string(path)?;
        let table = Self::from_json_str(&text)?;
        log::debug!("Loaded {} labels from {}", table.len(), path.display());
        Ok(table)
    }

    /// Name of class `index`.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    /// Number of classes.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Always false for a validated table.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Iterate over class names in index order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn json_labels(n: usize) -> String {
        let labels: Vec<String> = (0..n).map(|i| format!("class {}", i)).collect();
        serde_json::to_string(&labels).unwrap()
    }

    #[test]
    fn test_parse_full_table() {
        let table = LabelTable::from_json_str(&json_labels(1000)).unwrap();
        assert_eq!(table.len(), 1000);
        assert_eq!(table.get(0), Some("class 0"));
        assert_eq!(table.get(999), Some("class 999"));
        assert_eq!(table.get(1000), None);
    }

    #[test]
    fn test_rejects_wrong_length() {
        let err = LabelTable::from_json_str(&json_labels(10)).unwrap_err();
        assert_eq!(
            err,
            AdvIoError::LabelCount {
                expected: 1000,
                got: 10
            }
        );
    }

    #[test]
    fn test_rejects_non_string_entries() {
        assert!(matches!(
            LabelTable::from_json_str("[1, 2, 3]"),
            Err(AdvIoError::Json(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json_labels(1000).as_bytes()).unwrap();

        let table = LabelTable::load(file.path()).unwrap();
        assert_eq!(table.iter().nth(7), Some("class 7"));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = LabelTable::load(dir.path().join("labels.json")).unwrap_err();
        assert!(matches!(err, AdvIoError::MissingFile { .. }));
    }
}
