// Index lifecycle
// Keeps each registered metadata source's index in step with its file, one transition at a time


pub mod registry;
pub mod watcher;

pub use registry::{ActiveIndex, RegisteredSource, SourceRegistry, storage_dir_for};
pub use watcher::MetadataWatcher;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogSnapshot, Fingerprint};
use crate::embeddings::EmbeddingGateway;
use crate::index::{IndexDocument, IndexManifest};
use crate::{CatalogError, Result};

/// What a refresh did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshStatus {
    /// The active index already matched the file
    Skipped,
    /// An existing index was activated without embedding anything
    Loaded,
    /// The index was rebuilt from the file
    Updated,
}

impl fmt::Display for RefreshStatus {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Skipped => "skipped",
            Self::Loaded => "loaded",
            Self::Updated => "updated",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshOutcome {
    pub status: RefreshStatus,
    pub detail: String,
}

impl RefreshOutcome {
    fn new(status: RefreshStatus, detail: String) -> Self {
        Self { status, detail }
    }
}

/// Counters of the heavyweight transitions performed so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LifecycleStats {
    pub rebuilds: u64,
    pub loads: u64,
}

pub struct IndexLifecycle {
    registry: Arc<SourceRegistry>,
    embedder: OnceLock<Arc<dyn EmbeddingGateway>>,
    rebuild_lock: Mutex<()>,
    rebuilds: AtomicU64,
    loads: AtomicU64,
}

impl fmt::Debug for IndexLifecycle {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexLifecycle")
            .field("registry", &self.registry)
            .field("initialized", &self.embedder.get().is_some())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl IndexLifecycle {
    #[inline]
    pub fn new(registry: Arc<SourceRegistry>) -> Self {
        Self {
            registry,
            embedder: OnceLock::new(),
            rebuild_lock: Mutex::new(()),
            rebuilds: AtomicU64::new(0),
            loads: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.embedder.get().is_some()
    }

    /// The configured embedding gateway, `Unavailable` before [`Self::initialize`]
    #[inline]
    pub fn embedder(&self) -> Result<Arc<dyn EmbeddingGateway>> {
        self.embedder.get().cloned().ok_or_else(|| {
            CatalogError::Unavailable("embedding gateway is not configured yet".to_string())
        })
    }

    #[inline]
    pub fn stats(&self) -> LifecycleStats {
        LifecycleStats {
            rebuilds: self.rebuilds.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
        }
    }

    /// Install the embedding gateway and activate `metadata_path`.
    ///
    /// Unlike [`Self::ensure_fresh`] this always loads or builds, even when the source already
    /// looks current. A gateway installed by an earlier call is kept.
    #[inline]
    pub async fn initialize(
        &self,
        embedder: Arc<dyn EmbeddingGateway>,
        metadata_path: &Path,
    ) -> Result<RefreshOutcome> {
        if self.embedder.set(embedder).is_err() {
            debug!("Embedding gateway already configured, keeping the existing one");
        }

        let (canonical, fingerprint) = resolve_path(metadata_path).await?;
        let source = self.registry.resolve(&canonical).await;

        let _guard = self.rebuild_lock.lock().await;
        info!(
            "Initializing search index for {} (fingerprint {})",
            canonical.display(),
            fingerprint
        );
        self.load_or_build(&source, fingerprint).await
    }

    /// Bring the index for `metadata_path` up to date and make it the one queries use
    #[inline]
    pub async fn ensure_fresh(&self, metadata_path: &Path) -> Result<RefreshOutcome> {
        self.embedder()?;

        let (canonical, fingerprint) = resolve_path(metadata_path).await?;
        let source = self.registry.resolve(&canonical).await;

        if self.is_fresh(&source, fingerprint).await {
            debug!("{} unchanged since {}", canonical.display(), fingerprint);
            return Ok(skipped(&canonical, fingerprint));
        }

        let _guard = self.rebuild_lock.lock().await;

        if self.is_fresh(&source, fingerprint).await {
            debug!(
                "{} was refreshed while waiting for the rebuild lock",
                canonical.display()
            );
            return Ok(skipped(&canonical, fingerprint));
        }

        if source.covers(fingerprint).await && source.store().has_manifest().await {
            self.registry.set_current(Arc::clone(&source)).await;
            info!("Switched queries to the cached index for {}", canonical.display());
            return Ok(RefreshOutcome::new(
                RefreshStatus::Loaded,
                format!(
                    "Activated the in-memory index for {} (fingerprint {})",
                    canonical.display(),
                    fingerprint
                ),
            ));
        }

        self.load_or_build(&source, fingerprint).await
    }

    async fn is_fresh(&self, source: &Arc<RegisteredSource>, fingerprint: Fingerprint) -> bool {
        self.registry.is_current(source).await
            && source.covers(fingerprint).await
            && source.store().has_manifest().await
    }

    /// Load a persisted index that covers `fingerprint`, or rebuild. Callers hold the rebuild lock.
    async fn load_or_build(
        &self,
        source: &Arc<RegisteredSource>,
        fingerprint: Fingerprint,
    ) -> Result<RefreshOutcome> {
        let path = source.metadata_path();
        let snapshot = CatalogSnapshot::load(path, fingerprint).await?;

        if let Some(manifest) = source.store().read_manifest().await {
            if manifest.covers(path, fingerprint) {
                match source.store().load(&manifest).await {
                    Ok(index) => {
                        let recorded = manifest.fingerprint;
                        source
                            .publish(ActiveIndex::new(snapshot, index), recorded)
                            .await;
                        self.registry.set_current(Arc::clone(source)).await;
                        self.loads.fetch_add(1, Ordering::Relaxed);

                        info!(
                            "Loaded persisted index for {} ({} documents)",
                            path.display(),
                            manifest.document_count
                        );
                        return Ok(RefreshOutcome::new(
                            RefreshStatus::Loaded,
                            format!(
                                "Loaded the stored index for {} built at fingerprint {}",
                                path.display(),
                                recorded
                            ),
                        ));
                    }
                    Err(e) => warn!(
                        "Stored index for {} could not be loaded, rebuilding: {}",
                        path.display(),
                        e
                    ),
                }
            } else {
                debug!(
                    "Stored index for {} is at {}, file is at {}",
                    manifest.source_path.display(),
                    manifest.fingerprint,
                    fingerprint
                );
            }
        }

        self.rebuild(source, snapshot).await
    }

    async fn rebuild(
        &self,
        source: &Arc<RegisteredSource>,
        snapshot: CatalogSnapshot,
    ) -> Result<RefreshOutcome> {
        let path = source.metadata_path().to_path_buf();
        let fingerprint = snapshot.fingerprint();
        let embedder = self.embedder()?;

        info!(
            "Building index for {} from {} tables",
            path.display(),
            snapshot.len()
        );

        let texts: Vec<String> = snapshot
            .entries()
            .iter()
            .map(|entry| entry.document_text())
            .collect();
        let vectors = embed_documents(embedder, texts.clone()).await?;
        if vectors.len() != texts.len() {
            return Err(CatalogError::Embedding(format!(
                "Expected {} embeddings, received {}",
                texts.len(),
                vectors.len()
            )));
        }

        let documents = snapshot
            .entries()
            .iter()
            .zip(texts)
            .zip(vectors)
            .map(|((entry, content), vector)| IndexDocument {
                table_name: entry.name.clone(),
                content,
                vector,
            })
            .collect();

        let (index, manifest) = source.store().build(&path, fingerprint, documents).await?;
        let new_table = manifest.table_name.clone();

        let previous = source
            .publish(ActiveIndex::new(snapshot, index), fingerprint)
            .await;
        self.registry.set_current(Arc::clone(source)).await;
        self.rebuilds.fetch_add(1, Ordering::Relaxed);

        let previous_table = previous
            .as_ref()
            .and_then(|active| active.index().table_name().map(str::to_string));
        prune_superseded(source, &manifest, previous_table.as_deref()).await;

        info!(
            "Index for {} rebuilt with {} documents",
            path.display(),
            manifest.document_count
        );
        Ok(RefreshOutcome::new(
            RefreshStatus::Updated,
            format!(
                "Rebuilt the index for {} with {} tables (fingerprint {}, table {})",
                path.display(),
                manifest.document_count,
                fingerprint,
                new_table.as_deref().unwrap_or("none")
            ),
        ))
    }
}

fn skipped(path: &Path, fingerprint: Fingerprint) -> RefreshOutcome {
    RefreshOutcome::new(
        RefreshStatus::Skipped,
        format!(
            "Index for {} is current (fingerprint {})",
            path.display(),
            fingerprint
        ),
    )
}

async fn resolve_path(metadata_path: &Path) -> Result<(PathBuf, Fingerprint)> {
    let canonical = tokio::fs::canonicalize(metadata_path)
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CatalogError::NotFound {
                path: metadata_path.to_path_buf(),
            },
            _ => CatalogError::Io(e),
        })?;
    let fingerprint = Fingerprint::read(&canonical).await?;
    Ok((canonical, fingerprint))
}

async fn embed_documents(
    embedder: Arc<dyn EmbeddingGateway>,
    texts: Vec<String>,
) -> Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    tokio::task::spawn_blocking(move || embedder.embed_documents(&texts))
        .await
        .map_err(|e| CatalogError::Internal(format!("Embedding task failed: {}", e)))?
        .map_err(|e| CatalogError::Embedding(format!("{:#}", e)))
}

/// Drop tables older than the build just published and the one it replaced
async fn prune_superseded(
    source: &RegisteredSource,
    manifest: &IndexManifest,
    previous_table: Option<&str>,
) {
    let keep: Vec<&str> = manifest
        .table_name
        .as_deref()
        .into_iter()
        .chain(previous_table)
        .collect();

    if let Err(e) = source.store().prune(&keep).await {
        warn!(
            "Failed to prune old index tables in {}: {}",
            source.storage_dir().display(),
            e
        );
    }
}
