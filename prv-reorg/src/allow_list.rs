//! Patient allow-list loaded from CSV
//!
//! Expected format: a header row with a `patient_identifier` column; any
//! other columns are ignored.

use crate::error::{ReorgError, Result};
use csv::{ReaderBuilder, Trim};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Column holding the patient ids
pub const PATIENT_ID_COLUMN: &str = "patient_identifier";

/// Set of patient ids whose files are reorganized
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    ids: BTreeSet<String>,
}

impl AllowList {
    /// Load the allow-list from a CSV file
    ///
    /// A missing file, unreadable file or missing `patient_identifier`
    /// column is a configuration error.
    pub fn from_csv_path(path: &Path) -> Result<AllowList> {
        let file = File::open(path).map_err(|e| {
            ReorgError::Config(format!(
                "Cannot open allow-list {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_reader(file).map_err(|e| match e {
            ReorgError::Config(msg) => {
                ReorgError::Config(format!("{} ({})", msg, path.display()))
            }
            other => other,
        })
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<AllowList> {
        let mut reader = ReaderBuilder::new().trim(Trim::All).from_reader(reader);

        let column = reader
            .headers()
            .map_err(|e| ReorgError::Config(format!("Cannot read allow-list header: {}", e)))?
            .iter()
            .position(|h| h == PATIENT_ID_COLUMN)
            .ok_or_else(|| {
                ReorgError::Config(format!(
                    "Allow-list has no '{}' column",
                    PATIENT_ID_COLUMN
                ))
            })?;

        let mut ids = BTreeSet::new();
        for (line_number, record) in reader.records().enumerate() {
            let record = record.map_err(|e| {
                ReorgError::Config(format!(
                    "Allow-list line {}: {}",
                    line_number + 2, // header + 1-based
                    e
                ))
            })?;
            match record.get(column) {
                Some(id) if !id.is_empty() => {
                    ids.insert(id.to_string());
                }
                _ => {}
            }
        }

        Ok(AllowList { ids })
    }

    pub fn contains(&self, patient_id: &str) -> bool {
        self.ids.contains(patient_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Patient ids in sorted order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for AllowList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        AllowList {
            ids: iter.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_reads_patient_column() {
        let csv = "site,patient_identifier,notes\n001,4ZHY,first\n002, AB12 ,\n003,,empty\n";
        let list = AllowList::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(list.len(), 2);
        assert!(list.contains("4ZHY"));
        assert!(list.contains("AB12"));
        assert_eq!(list.iter().collect::<Vec<_>>(), vec!["4ZHY", "AB12"]);
    }

    #[test]
    fn test_missing_column_is_config_error() {
        let csv = "site,patient\n001,4ZHY\n";
        let result = AllowList::from_reader(csv.as_bytes());
        assert!(matches!(result, Err(ReorgError::Config(msg)) if msg.contains(PATIENT_ID_COLUMN)));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = AllowList::from_csv_path(&temp_dir.path().join("absent.csv"));
        assert!(matches!(result, Err(ReorgError::Config(_))));
    }

    #[test]
    fn test_from_iterator() {
        let list: AllowList = ["4ZHY", "AB12"].into_iter().collect();
        assert!(list.contains("AB12"));
        assert!(!list.contains("ZZZZ"));
    }
}
