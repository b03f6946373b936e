// External catalog link configuration
// Resolves the catalog base URL used in result links and keeps it current while serving


use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::LinksConfig;

/// Environment override for the catalog base URL, checked before any file
pub const BASE_URL_ENV_VAR: &str = "OPENMETADATA_BASE_URL";
/// Environment override for the location of the base URL file
pub const CONFIG_FILE_ENV_VAR: &str = "OPENMETADATA_CONFIG_FILE";
pub const DEFAULT_BASE_URL: &str = "http://localhost:8585/";

const DEFAULT_CONFIG_FILE: &str = ".env";
const BASE_URL_KEY: &str = "OPENMETADATA_BASE_URL=";

/// Where the active base URL came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaseUrlSource {
    Environment,
    File(PathBuf),
    Default,
}

/// Path of the KEY=VALUE file holding the base URL
#[inline]
pub fn links_config_file(config: &LinksConfig) -> PathBuf {
    env::var_os(CONFIG_FILE_ENV_VAR)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .or_else(|| config.config_file.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// Read the base URL out of a KEY=VALUE file.
///
/// Blank lines and `#` comments are skipped. The first `OPENMETADATA_BASE_URL=` entry wins; a line
/// without `=` is taken as the URL itself.
#[inline]
pub fn read_base_url_from_file(path: &Path) -> Option<String> {
    base_url_from_content(path, fs::read_to_string(path))
}

fn base_url_from_content(path: &Path, content: std::io::Result<String>) -> Option<String> {
    let content = match content {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!("Failed to read link config file {}: {}", path.display(), e);
            return None;
        }
    };

    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(value) = line.strip_prefix(BASE_URL_KEY) {
            let value = value.trim();
            return (!value.is_empty()).then(|| value.to_string());
        }
        if !line.contains('=') {
            return Some(line.to_string());
        }
    }

    None
}

/// Resolve the base URL: environment, then `config_file`, then the built-in default
#[inline]
pub fn resolve_base_url(config_file: &Path) -> (String, BaseUrlSource) {
    if let Some(value) = env::var(BASE_URL_ENV_VAR).ok().filter(|v| !v.is_empty()) {
        return (value, BaseUrlSource::Environment);
    }

    if let Some(value) = read_base_url_from_file(config_file) {
        return (value, BaseUrlSource::File(config_file.to_path_buf()));
    }

    (DEFAULT_BASE_URL.to_string(), BaseUrlSource::Default)
}

/// Link to a table in the external catalog's search page.
///
/// The table name is form-urlencoded and a trailing `/` on `base_url` is dropped, so links for
/// names with spaces or symbols differ from a raw string interpolation of the template.
#[inline]
pub fn table_url(base_url: &str, table_name: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(table_name.as_bytes()).collect();
    format!(
        "{}/explore/?search={}&sort=_score&page=1&size=15",
        base_url.trim_end_matches('/'),
        encoded
    )
}

/// Shared, atomically replaced catalog base URL
#[derive(Debug)]
pub struct CatalogLinks {
    base_url: watch::Sender<String>,
}

impl CatalogLinks {
    #[inline]
    pub fn new(base_url: String) -> Self {
        let (base_url, _) = watch::channel(base_url);
        Self { base_url }
    }

    #[inline]
    pub fn base_url(&self) -> String {
        self.base_url.borrow().clone()
    }

    /// Replace the base URL, returning whether it changed
    #[inline]
    pub fn set_base_url(&self, base_url: String) -> bool {
        self.base_url.send_if_modified(|current| {
            if *current == base_url {
                false
            } else {
                *current = base_url;
                true
            }
        })
    }

    #[inline]
    pub fn table_url(&self, table_name: &str) -> String {
        table_url(&self.base_url.borrow(), table_name)
    }
}

/// Polls the base URL file and republishes its value when it changes
pub struct BaseUrlWatcher {
    config_file: PathBuf,
    poll_interval: Duration,
    links: Arc<CatalogLinks>,
}

impl BaseUrlWatcher {
    #[inline]
    pub fn new(config_file: PathBuf, poll_interval: Duration, links: Arc<CatalogLinks>) -> Self {
        Self {
            config_file,
            poll_interval,
            links,
        }
    }

    /// Record the file's current mtime, then poll until `shutdown` flips to true or its sender is
    /// dropped
    #[inline]
    pub async fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let last_modified = modified_time(&self.config_file).await;
        tokio::spawn(self.run(last_modified, shutdown))
    }

    async fn run(self, mut last_modified: Option<SystemTime>, mut shutdown: watch::Receiver<bool>) {
        info!("Watching {} for catalog URL changes", self.config_file.display());

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let modified = modified_time(&self.config_file).await;
                    if modified == last_modified {
                        continue;
                    }
                    last_modified = modified;
                    self.reload().await;
                }
            }
        }

        info!("Stopped watching {}", self.config_file.display());
    }

    async fn reload(&self) {
        let content = tokio::fs::read_to_string(&self.config_file).await;
        let value = base_url_from_content(&self.config_file, content)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        if self.links.set_base_url(value.clone()) {
            info!("Catalog base URL updated: {}", value);
        } else {
            debug!("Link config file changed but the base URL did not");
        }
    }
}

async fn modified_time(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path)
        .await
        .and_then(|m| m.modified())
        .ok()
}
