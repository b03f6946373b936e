// Query service
// Wires the lifecycle, ranking engine and link resolution behind request/response calls


use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::catalog::Fingerprint;
use crate::config::links::{links_config_file, resolve_base_url};
use crate::config::{BaseUrlSource, BaseUrlWatcher, CatalogLinks, Config};
use crate::embeddings::{EmbeddingGateway, OllamaClient};
use crate::lifecycle::{
    IndexLifecycle, LifecycleStats, MetadataWatcher, RefreshOutcome, SourceRegistry,
};
use crate::ranking::{self, RankedTable};
use crate::{CatalogError, ErrorKind, Result};

const INTERNAL_SEARCH_FAILURE: &str = "An internal error occurred while processing the search";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorBody {
    /// Caller-facing body for `error`; internal failures are reduced to `generic_message`
    #[inline]
    pub fn from_error(error: &CatalogError, generic_message: &str) -> Self {
        let kind = error.kind();
        let message = match kind {
            ErrorKind::InternalError => generic_message.to_string(),
            _ => error.to_string(),
        };
        Self { kind, message }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResponse {
    pub status: ResponseStatus,
    pub original_query: String,
    pub results: Option<Vec<RankedTable>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl SearchResponse {
    #[inline]
    pub fn success(query: &str, results: Vec<RankedTable>) -> Self {
        Self {
            status: ResponseStatus::Success,
            original_query: query.to_string(),
            results: Some(results),
            error: None,
        }
    }

    #[inline]
    pub fn failure(query: &str, error: ErrorBody) -> Self {
        Self {
            status: ResponseStatus::Error,
            original_query: query.to_string(),
            results: None,
            error: Some(error),
        }
    }
}

/// State of one registered metadata source
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceStatus {
    pub metadata_path: PathBuf,
    pub storage_dir: PathBuf,
    pub last_known_fingerprint: Option<Fingerprint>,
    pub document_count: usize,
    pub is_current: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceStatus {
    pub initialized: bool,
    pub metadata_path: Option<PathBuf>,
    pub storage_dir: Option<PathBuf>,
    pub fingerprint: Option<Fingerprint>,
    pub table_count: usize,
    pub index_table: Option<String>,
    pub sources: Vec<SourceStatus>,
    pub base_url: String,
    pub stats: LifecycleStats,
}

pub struct CatalogService {
    lifecycle: Arc<IndexLifecycle>,
    links: Arc<CatalogLinks>,
    base_url_source: BaseUrlSource,
    link_config_file: PathBuf,
    default_metadata_path: PathBuf,
    top_k: usize,
    poll_interval: std::time::Duration,
    watch_interval: Option<std::time::Duration>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl CatalogService {
    /// Set up state from `config` without touching the index
    #[inline]
    pub fn new(config: &Config) -> Self {
        let link_config_file = links_config_file(&config.links);
        let (base_url, base_url_source) = resolve_base_url(&link_config_file);
        info!("Catalog base URL: {} ({:?})", base_url, base_url_source);

        let registry = Arc::new(SourceRegistry::new(config.index_dir_path()));
        let (shutdown, _) = watch::channel(false);

        Self {
            lifecycle: Arc::new(IndexLifecycle::new(registry)),
            links: Arc::new(CatalogLinks::new(base_url)),
            base_url_source,
            link_config_file,
            default_metadata_path: config.catalog.metadata_path.clone(),
            top_k: config.catalog.top_k,
            poll_interval: config.links.poll_interval(),
            watch_interval: config.catalog.watch_interval(),
            shutdown,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Connect to Ollama, build or load the default index and start background watchers
    #[inline]
    pub async fn start(config: &Config) -> Result<Self> {
        let client = OllamaClient::new(&config.ollama)
            .map_err(|e| CatalogError::Config(format!("{:#}", e)))?;

        let probe = client.clone();
        match tokio::task::spawn_blocking(move || probe.health_check()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Ollama health check failed: {:#}", e),
            Err(e) => warn!("Ollama health check did not complete: {}", e),
        }

        Self::start_with(config, Arc::new(client)).await
    }

    /// [`Self::start`] with a caller-supplied embedding gateway
    #[inline]
    pub async fn start_with(config: &Config, embedder: Arc<dyn EmbeddingGateway>) -> Result<Self> {
        let service = Self::new(config);
        let outcome = service.initialize(embedder).await?;
        info!("Search engine ready: {}", outcome.detail);
        service.spawn_watchers().await;
        Ok(service)
    }

    #[inline]
    pub async fn initialize(&self, embedder: Arc<dyn EmbeddingGateway>) -> Result<RefreshOutcome> {
        self.lifecycle
            .initialize(embedder, &self.default_metadata_path)
            .await
    }

    /// Start the base URL watcher, unless the URL comes from the environment, and the
    /// metadata watcher when a check interval is configured
    #[inline]
    pub async fn spawn_watchers(&self) {
        let mut tasks = self.tasks.lock().await;

        if self.base_url_source == BaseUrlSource::Environment {
            info!("Catalog base URL set by the environment, not watching the link config file");
        } else {
            let watcher = BaseUrlWatcher::new(
                self.link_config_file.clone(),
                self.poll_interval,
                Arc::clone(&self.links),
            );
            tasks.push(watcher.spawn(self.shutdown.subscribe()).await);
        }

        if let Some(interval) = self.watch_interval {
            let watcher = MetadataWatcher::new(Arc::clone(&self.lifecycle), interval);
            tasks.push(watcher.spawn(self.shutdown.subscribe()));
        }
    }

    #[inline]
    pub fn lifecycle(&self) -> &Arc<IndexLifecycle> {
        &self.lifecycle
    }

    #[inline]
    pub fn links(&self) -> &Arc<CatalogLinks> {
        &self.links
    }

    #[inline]
    pub fn default_metadata_path(&self) -> &Path {
        &self.default_metadata_path
    }

    /// Answer `query`, folding failures into the response
    #[inline]
    pub async fn search(&self, query: &str) -> SearchResponse {
        info!("Received query: {}", query);

        match self.try_search(query).await {
            Ok(results) => SearchResponse::success(query, results),
            Err(e) => {
                if e.kind() == ErrorKind::InternalError {
                    error!("Search for {:?} failed: {:?}", query, e);
                } else {
                    warn!("Search for {:?} rejected: {}", query, e);
                }
                SearchResponse::failure(query, ErrorBody::from_error(&e, INTERNAL_SEARCH_FAILURE))
            }
        }
    }

    /// Rank catalog tables for `query`; blank queries match nothing
    #[inline]
    pub async fn try_search(&self, query: &str) -> Result<Vec<RankedTable>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let embedder = self.lifecycle.embedder()?;
        let active = self.lifecycle.registry().active().await.ok_or_else(|| {
            CatalogError::Unavailable("no search index has been activated yet".to_string())
        })?;

        let owned_query = query.to_string();
        let query_vector = tokio::task::spawn_blocking(move || embedder.embed_query(&owned_query))
            .await
            .map_err(|e| CatalogError::Internal(format!("Query embedding task failed: {}", e)))?
            .map_err(|e| CatalogError::Embedding(format!("{:#}", e)))?;

        ranking::search(
            active.index(),
            active.snapshot(),
            &self.links,
            query,
            &query_vector,
            self.top_k,
        )
        .await
    }

    /// Refresh `metadata_path`, or the configured default when `None`
    #[inline]
    pub async fn refresh(&self, metadata_path: Option<&Path>) -> Result<RefreshOutcome> {
        let path = metadata_path.unwrap_or(&self.default_metadata_path);
        let outcome = self.lifecycle.ensure_fresh(path).await?;
        info!("Refresh of {}: {}", path.display(), outcome.status);
        Ok(outcome)
    }

    #[inline]
    pub async fn status(&self) -> ServiceStatus {
        let registry = self.lifecycle.registry();
        let current = registry.current().await;
        let active = match &current {
            Some(source) => source.active().await,
            None => None,
        };

        ServiceStatus {
            initialized: self.lifecycle.is_initialized(),
            metadata_path: current.as_ref().map(|s| s.metadata_path().to_path_buf()),
            storage_dir: current.as_ref().map(|s| s.storage_dir().to_path_buf()),
            fingerprint: active.as_ref().map(|a| a.snapshot().fingerprint()),
            table_count: active.as_ref().map_or(0, |a| a.snapshot().len()),
            index_table: active
                .as_ref()
                .and_then(|a| a.index().table_name().map(str::to_string)),
            sources: self.source_statuses().await,
            base_url: self.links.base_url(),
            stats: self.lifecycle.stats(),
        }
    }

    async fn source_statuses(&self) -> Vec<SourceStatus> {
        let registry = self.lifecycle.registry();
        let mut statuses = Vec::new();
        for source in registry.sources().await {
            let document_count = source
                .active()
                .await
                .map_or(0, |active| active.index().document_count());
            statuses.push(SourceStatus {
                metadata_path: source.metadata_path().to_path_buf(),
                storage_dir: source.storage_dir().to_path_buf(),
                last_known_fingerprint: source.last_known_fingerprint().await,
                document_count,
                is_current: registry.is_current(&source).await,
            });
        }
        statuses.sort_by(|a, b| a.metadata_path.cmp(&b.metadata_path));
        statuses
    }

    /// Stop background watchers, abandoning any refresh they are running, and forget all sources
    #[inline]
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!("Background task ended abnormally: {}", e);
            }
        }

        self.lifecycle.registry().clear().await;
        info!("Search service stopped");
    }
}
