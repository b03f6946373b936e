#[cfg(test)]
mod tests;

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::Fingerprint;
use crate::{CatalogError, Result};

pub const MANIFEST_FILE: &str = "manifest.json";
const MANIFEST_TMP_FILE: &str = "manifest.json.tmp";

/// Record of the index last published into a storage directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexManifest {
    /// Canonical path of the metadata file the index was built from
    pub source_path: PathBuf,
    /// Fingerprint of that file when it was read for the build
    pub fingerprint: Fingerprint,
    /// LanceDB table holding the documents, absent for an empty catalog
    pub table_name: Option<String>,
    pub document_count: usize,
    pub dimension: usize,
    pub built_at: DateTime<Utc>,
}

impl IndexManifest {
    #[inline]
    pub fn path_in(storage_dir: &Path) -> PathBuf {
        storage_dir.join(MANIFEST_FILE)
    }

    /// Whether the recorded build can serve `source_path` at `fingerprint`
    #[inline]
    pub fn covers(&self, source_path: &Path, fingerprint: Fingerprint) -> bool {
        self.source_path == source_path && self.fingerprint >= fingerprint
    }

    #[inline]
    pub async fn exists_in(storage_dir: &Path) -> bool {
        tokio::fs::try_exists(Self::path_in(storage_dir))
            .await
            .unwrap_or(false)
    }

    /// Read the manifest, `Ok(None)` when the directory holds none
    #[inline]
    pub async fn read(storage_dir: &Path) -> Result<Option<Self>> {
        let path = Self::path_in(storage_dir);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CatalogError::Io(e)),
        };

        let manifest = serde_json::from_str(&content).map_err(|e| {
            CatalogError::Index(format!("Invalid manifest {}: {}", path.display(), e))
        })?;
        Ok(Some(manifest))
    }

    /// Replace the manifest in one rename so readers never see a partial file
    #[inline]
    pub async fn write(&self, storage_dir: &Path) -> Result<()> {
        tokio::fs::create_dir_all(storage_dir).await?;

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| CatalogError::Index(format!("Failed to serialize manifest: {}", e)))?;
        let tmp_path = storage_dir.join(MANIFEST_TMP_FILE);
        tokio::fs::write(&tmp_path, content).await?;
        tokio::fs::rename(&tmp_path, Self::path_in(storage_dir)).await?;

        debug!(
            "Published manifest for {} at {}",
            self.source_path.display(),
            storage_dir.display()
        );
        Ok(())
    }
}
