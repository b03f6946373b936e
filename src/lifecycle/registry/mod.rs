
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::catalog::{CatalogSnapshot, Fingerprint};
use crate::index::{CatalogIndex, LanceIndexStore};

const MAX_STEM_LEN: usize = 48;

/// A catalog snapshot and the index built from exactly its entries, published together
#[derive(Debug)]
pub struct ActiveIndex {
    snapshot: CatalogSnapshot,
    index: CatalogIndex,
}

impl ActiveIndex {
    #[inline]
    pub fn new(snapshot: CatalogSnapshot, index: CatalogIndex) -> Self {
        Self { snapshot, index }
    }

    #[inline]
    pub fn snapshot(&self) -> &CatalogSnapshot {
        &self.snapshot
    }

    #[inline]
    pub fn index(&self) -> &CatalogIndex {
        &self.index
    }
}

/// State kept for one metadata file
#[derive(Debug)]
pub struct RegisteredSource {
    metadata_path: PathBuf,
    store: LanceIndexStore,
    last_known_fingerprint: RwLock<Option<Fingerprint>>,
    active: RwLock<Option<Arc<ActiveIndex>>>,
}

impl RegisteredSource {
    fn new(metadata_path: PathBuf, storage_dir: PathBuf) -> Self {
        Self {
            metadata_path,
            store: LanceIndexStore::new(storage_dir),
            last_known_fingerprint: RwLock::new(None),
            active: RwLock::new(None),
        }
    }

    #[inline]
    pub fn metadata_path(&self) -> &Path {
        &self.metadata_path
    }

    #[inline]
    pub fn storage_dir(&self) -> &Path {
        self.store.storage_dir()
    }

    #[inline]
    pub fn store(&self) -> &LanceIndexStore {
        &self.store
    }

    #[inline]
    pub async fn active(&self) -> Option<Arc<ActiveIndex>> {
        self.active.read().await.clone()
    }

    #[inline]
    pub async fn last_known_fingerprint(&self) -> Option<Fingerprint> {
        *self.last_known_fingerprint.read().await
    }

    /// Whether an active build already covers `fingerprint`
    #[inline]
    pub async fn covers(&self, fingerprint: Fingerprint) -> bool {
        let known = self.last_known_fingerprint().await;
        self.active.read().await.is_some() && known.is_some_and(|known| known >= fingerprint)
    }

    /// Swap in a new active pair, returning the one it replaced.
    ///
    /// The last known fingerprint only moves forward.
    pub(crate) async fn publish(
        &self,
        active: ActiveIndex,
        fingerprint: Fingerprint,
    ) -> Option<Arc<ActiveIndex>> {
        let previous = self.active.write().await.replace(Arc::new(active));

        let mut known = self.last_known_fingerprint.write().await;
        if known.is_none_or(|known| known < fingerprint) {
            *known = Some(fingerprint);
        }

        previous
    }
}

/// Every metadata source seen by this process, plus the one serving queries
#[derive(Debug)]
pub struct SourceRegistry {
    index_root: PathBuf,
    sources: RwLock<HashMap<PathBuf, Arc<RegisteredSource>>>,
    current: RwLock<Option<Arc<RegisteredSource>>>,
}

impl SourceRegistry {
    #[inline]
    pub fn new(index_root: PathBuf) -> Self {
        Self {
            index_root,
            sources: RwLock::new(HashMap::new()),
            current: RwLock::new(None),
        }
    }

    #[inline]
    pub fn index_root(&self) -> &Path {
        &self.index_root
    }

    /// Get or create the entry for a canonical metadata path
    #[inline]
    pub async fn resolve(&self, metadata_path: &Path) -> Arc<RegisteredSource> {
        if let Some(source) = self.sources.read().await.get(metadata_path) {
            return Arc::clone(source);
        }

        let mut sources = self.sources.write().await;
        let source = sources
            .entry(metadata_path.to_path_buf())
            .or_insert_with(|| {
                let storage_dir = storage_dir_for(&self.index_root, metadata_path);
                debug!(
                    "Registered {} with index storage {}",
                    metadata_path.display(),
                    storage_dir.display()
                );
                Arc::new(RegisteredSource::new(
                    metadata_path.to_path_buf(),
                    storage_dir,
                ))
            });
        Arc::clone(source)
    }

    #[inline]
    pub async fn current(&self) -> Option<Arc<RegisteredSource>> {
        self.current.read().await.clone()
    }

    #[inline]
    pub async fn is_current(&self, source: &Arc<RegisteredSource>) -> bool {
        self.current
            .read()
            .await
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, source))
    }

    #[inline]
    pub async fn set_current(&self, source: Arc<RegisteredSource>) {
        *self.current.write().await = Some(source);
    }

    /// The pair queries should run against
    #[inline]
    pub async fn active(&self) -> Option<Arc<ActiveIndex>> {
        let current = self.current().await?;
        current.active().await
    }

    #[inline]
    pub async fn sources(&self) -> Vec<Arc<RegisteredSource>> {
        self.sources.read().await.values().cloned().collect()
    }

    /// Forget every source
    #[inline]
    pub async fn clear(&self) {
        *self.current.write().await = None;
        self.sources.write().await.clear();
    }
}

/// Directory holding the index for `metadata_path`, stable across restarts
#[inline]
pub fn storage_dir_for(index_root: &Path, metadata_path: &Path) -> PathBuf {
    let stem: String = metadata_path
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_STEM_LEN)
        .collect();

    let id = Uuid::new_v5(
        &Uuid::NAMESPACE_URL,
        metadata_path.as_os_str().as_encoded_bytes(),
    );

    let name = if stem.is_empty() {
        id.simple().to_string()
    } else {
        format!("{}-{}", stem, id.simple())
    };
    index_root.join(name)
}
