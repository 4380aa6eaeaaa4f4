//! Per-layer change watching
//!
//! Each layer gets one watcher task. The watcher spawns the source's own
//! background loop, then waits on the source's notifier; on each signal it
//! invalidates the cache, reloads, validates, and diffs the fresh entries
//! against the layer's previous entries. A notification flows upward only
//! when the per-layer delta is non-empty or an error occurred, so
//! byte-identical reloads stay silent.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::entry::{Entries, EntriesDelta};
use crate::error::ConfigError;
use crate::source::Cache;

/// One layer's reload outcome, sent to the orchestration loop
pub struct WatcherNotification {
    /// Index of the layer in the orchestrator's cache list
    pub layer: usize,
    /// Source description, cross-checked against the layer index
    pub description: String,
    /// Fresh entry set, absent when the reload failed
    pub entries: Option<Entries>,
    pub delta: EntriesDelta,
    pub error: Option<ConfigError>,
}

pub(crate) struct LayerWatcher {
    layer: usize,
    cache: Arc<Cache>,
    previous: Entries,
    notifications: mpsc::Sender<WatcherNotification>,
}

impl LayerWatcher {
    pub(crate) fn new(
        layer: usize,
        cache: Arc<Cache>,
        mut previous: Entries,
        notifications: mpsc::Sender<WatcherNotification>,
    ) -> Self {
        previous.sort_by_normalized_name();
        Self {
            layer,
            cache,
            previous,
            notifications,
        }
    }

    pub(crate) async fn watch(mut self, cancel: CancellationToken) {
        let Some(notifier) = self.cache.notifier() else {
            // Static layer; nothing will ever change.
            return;
        };

        let runner = {
            let source = self.cache.source();
            let cancel = cancel.clone();
            tokio::spawn(async move { source.run(cancel).await })
        };

        debug!(source = %self.cache.describe(), "Watching configuration layer");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = notifier.notified() => self.reload().await,
            }
        }

        let _ = runner.await;
    }

    async fn reload(&mut self) {
        self.cache.invalidate();

        let outcome = match self.cache.load().await {
            Ok(mut entries) => entries.validate().map(|_| entries),
            Err(e) => Err(e),
        };

        let notification = match outcome {
            Ok(entries) => {
                let delta = self.previous.compare(&entries);
                if delta.is_empty() {
                    debug!(
                        source = %self.cache.describe(),
                        "Reload produced no changes"
                    );
                    return;
                }

                info!(
                    source = %self.cache.describe(),
                    changes = delta.len(),
                    "Configuration layer changed"
                );
                self.previous = entries.clone();

                WatcherNotification {
                    layer: self.layer,
                    description: self.cache.describe(),
                    entries: Some(entries),
                    delta,
                    error: None,
                }
            }
            Err(e) => {
                error!(source = %self.cache.describe(), "Reload failed: {e}");
                WatcherNotification {
                    layer: self.layer,
                    description: self.cache.describe(),
                    entries: None,
                    delta: EntriesDelta::default(),
                    error: Some(e),
                }
            }
        };

        let _ = self.notifications.send(notification).await;
    }
}
