
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{IndexLifecycle, RefreshStatus};

/// Periodically refreshes the source currently serving queries.
///
/// A refresh in progress when shutdown is signalled is dropped, which releases the rebuild lock.
pub struct MetadataWatcher {
    lifecycle: Arc<IndexLifecycle>,
    interval: Duration,
}

impl MetadataWatcher {
    #[inline]
    pub fn new(lifecycle: Arc<IndexLifecycle>, interval: Duration) -> Self {
        Self {
            lifecycle,
            interval,
        }
    }

    #[inline]
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("Checking metadata for changes every {:?}", self.interval);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately and the index was just initialized.
        ticker.tick().await;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let Some(path) = self.current_path().await else {
                        continue;
                    };

                    tokio::select! {
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                info!("Abandoning refresh of {} for shutdown", path.display());
                                break;
                            }
                        }
                        result = self.lifecycle.ensure_fresh(&path) => match result {
                            Ok(outcome) if outcome.status == RefreshStatus::Skipped => {
                                debug!("{}", outcome.detail);
                            }
                            Ok(outcome) => info!("Metadata change picked up: {}", outcome.detail),
                            Err(e) => warn!("Scheduled refresh of {} failed: {}", path.display(), e),
                        }
                    }
                }
            }
        }

        info!("Stopped checking metadata for changes");
    }

    async fn current_path(&self) -> Option<PathBuf> {
        let source = self.lifecycle.registry().current().await?;
        Some(source.metadata_path().to_path_buf())
    }
}
