// Catalog metadata module
// Loads the table/column description document and composes the text each table is embedded as

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{CatalogError, Result};

/// Data type reported for columns whose metadata does not carry one
pub const UNKNOWN_DATA_TYPE: &str = "N/A";

/// A single column of a catalog table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnEntry {
    pub name: String,
    pub description: String,
    #[serde(
        rename = "dataTypeDisplay",
        default = "default_data_type",
        deserialize_with = "null_as_unknown_type"
    )]
    pub data_type: String,
    #[serde(rename = "isPrimaryKey", default, deserialize_with = "null_as_false")]
    pub is_primary_key: bool,
}

/// A catalog table with its columns, identified by `name`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub columns: Vec<ColumnEntry>,
}

fn default_data_type() -> String {
    UNKNOWN_DATA_TYPE.to_string()
}

fn null_as_unknown_type<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(default_data_type))
}

fn null_as_false<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

impl CatalogEntry {
    /// Text handed to the embedding model for this table.
    ///
    /// Indexes built from different renderings are not comparable, so this layout must not change.
    #[inline]
    pub fn document_text(&self) -> String {
        let column_lines: Vec<String> = self
            .columns
            .iter()
            .map(|column| format!("- 컬럼 '{}': {}", column.name, column.description))
            .collect();

        format!(
            "테이블명: {}\n테이블 설명: {}\n포함된 컬럼 정보:\n{}",
            self.name,
            self.description,
            column_lines.join("\n")
        )
    }
}

/// Modification time of a metadata source, used to detect staleness
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(DateTime<Utc>);

impl Fingerprint {
    #[inline]
    pub fn from_system_time(time: SystemTime) -> Self {
        Self(DateTime::<Utc>::from(time))
    }

    #[inline]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.0
    }

    /// Read the current fingerprint of `path`
    #[inline]
    pub async fn read(path: &Path) -> Result<Self> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| io_error_for(path, e))?;
        let modified = metadata.modified()?;
        Ok(Self::from_system_time(modified))
    }
}

impl fmt::Display for Fingerprint {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

/// All entries of one load of a metadata source, paired with the fingerprint it was read at
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    source_path: PathBuf,
    fingerprint: Fingerprint,
    entries: Vec<CatalogEntry>,
    by_name: HashMap<String, usize>,
}

impl CatalogSnapshot {
    #[inline]
    pub fn new(source_path: PathBuf, fingerprint: Fingerprint, entries: Vec<CatalogEntry>) -> Self {
        let by_name = entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (entry.name.clone(), position))
            .collect();

        Self {
            source_path,
            fingerprint,
            entries,
            by_name,
        }
    }

    /// Parse a metadata document
    #[inline]
    pub fn parse(source_path: &Path, fingerprint: Fingerprint, content: &str) -> Result<Self> {
        let entries: Vec<CatalogEntry> =
            serde_json::from_str(content).map_err(|e| CatalogError::Parse {
                path: source_path.to_path_buf(),
                message: e.to_string(),
                line: Some(e.line()),
                column: Some(e.column()),
            })?;

        Ok(Self::new(source_path.to_path_buf(), fingerprint, entries))
    }

    /// Load the metadata document at `path`, stamped with `fingerprint`
    #[inline]
    pub async fn load(path: &Path, fingerprint: Fingerprint) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| io_error_for(path, e))?;

        let snapshot = Self::parse(path, fingerprint, &content)?;
        debug!(
            "Loaded {} catalog entries from {}",
            snapshot.len(),
            path.display()
        );
        Ok(snapshot)
    }

    #[inline]
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    #[inline]
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Entries in document order
    #[inline]
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Look up a table by name. Duplicate names resolve to the last occurrence.
    #[inline]
    pub fn get(&self, table_name: &str) -> Option<&CatalogEntry> {
        self.by_name
            .get(table_name)
            .and_then(|&position| self.entries.get(position))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn io_error_for(path: &Path, error: std::io::Error) -> CatalogError {
    match error.kind() {
        ErrorKind::NotFound => CatalogError::NotFound {
            path: path.to_path_buf(),
        },
        // Raised by read_to_string for content that is not UTF-8
        ErrorKind::InvalidData => CatalogError::Parse {
            path: path.to_path_buf(),
            message: error.to_string(),
            line: None,
            column: None,
        },
        _ => CatalogError::Io(error),
    }
}
