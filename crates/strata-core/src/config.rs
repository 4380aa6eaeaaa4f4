//! Layered configuration orchestrator
//!
//! `Config` owns the ordered layer list. `load` performs the synchronous
//! first pass (load every layer, merge, resolve); `watch` then keeps the
//! resolved view current by fanning per-layer change notifications into one
//! processing loop. Readers always see a complete snapshot: "latest" is only
//! ever replaced wholesale, and a failing layer reload leaves the previous
//! view authoritative.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::entry::{Entries, merge_layers};
use crate::error::{ConfigError, Result};
use crate::expression::ExpressionResolver;
use crate::populate::{Populate, PopulatorSource};
use crate::snapshot::{ResolvedEntry, Snapshot, SnapshotValues, Values};
use crate::source::Cache;
use crate::value::Value;
use crate::watcher::{LayerWatcher, WatcherNotification};

const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(90);

pub struct Config {
    layers: Vec<Arc<Cache>>,
    original: RwLock<Option<Arc<SnapshotValues>>>,
    latest: RwLock<Option<Arc<SnapshotValues>>>,
    watching: AtomicBool,
    notify_tx: broadcast::Sender<Arc<Snapshot>>,
    load_timeout: Duration,
}

impl Config {
    pub fn new(layers: Vec<Arc<Cache>>) -> Self {
        let (notify_tx, _) = broadcast::channel(16);
        Self {
            layers,
            original: RwLock::new(None),
            latest: RwLock::new(None),
            watching: AtomicBool::new(false),
            notify_tx,
            load_timeout: DEFAULT_LOAD_TIMEOUT,
        }
    }

    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = timeout;
        self
    }

    /// Load every layer, merge by precedence, and resolve all expressions.
    /// Sets both the "original" and "latest" views. Any layer failure or a
    /// resolution failure is fatal to the caller.
    pub async fn load(&self) -> Result<Arc<Snapshot>> {
        let loaded = tokio::time::timeout(self.load_timeout, self.load_layers())
            .await
            .map_err(|_| {
                ConfigError::source_error(
                    "Configuration",
                    format!("Load timed out after {:?}", self.load_timeout),
                )
            })?;
        let layer_entries = loaded?;

        let merged = merge_layers(&layer_entries);
        let snapshot = Arc::new(Snapshot::resolve(&merged, &SnapshotValues::default())?);
        let values = Arc::new(snapshot.values.clone());

        *write_lock(&self.original) = Some(Arc::clone(&values));
        *write_lock(&self.latest) = Some(values);

        info!(
            layers = self.layers.len(),
            settings = snapshot.values.len(),
            "Configuration loaded"
        );
        Ok(snapshot)
    }

    async fn load_layers(&self) -> Result<Vec<Entries>> {
        let mut layer_entries = Vec::with_capacity(self.layers.len());
        for cache in &self.layers {
            let mut entries = cache.load().await?;
            entries.validate()?;
            layer_entries.push(entries);
        }
        Ok(layer_entries)
    }

    /// Start watching every layer for changes. No-op when already watching
    /// or when there are no layers; requires a completed `load`. Watching
    /// stops when the token is cancelled.
    pub async fn watch(self: &Arc<Self>, cancel: CancellationToken) -> Result<()> {
        if self.layers.is_empty() {
            return Ok(());
        }
        if self.watching.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if read_lock(&self.latest).is_none() {
            self.watching.store(false, Ordering::SeqCst);
            return Err(ConfigError::NotLoaded);
        }

        // Layer loads here hit the caches warmed by `load`.
        let layer_entries = match self.load_layers().await {
            Ok(entries) => entries,
            Err(e) => {
                self.watching.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        let (tx, rx) = mpsc::channel(16);
        for (layer, cache) in self.layers.iter().enumerate() {
            let watcher = LayerWatcher::new(
                layer,
                Arc::clone(cache),
                layer_entries[layer].clone(),
                tx.clone(),
            );
            let cancel = cancel.clone();
            tokio::spawn(async move { watcher.watch(cancel).await });
        }
        drop(tx);

        let config = Arc::clone(self);
        tokio::spawn(async move {
            config.process_notifications(rx, layer_entries, cancel).await;
        });

        Ok(())
    }

    async fn process_notifications(
        &self,
        mut notifications: mpsc::Receiver<WatcherNotification>,
        mut layer_entries: Vec<Entries>,
        cancel: CancellationToken,
    ) {
        loop {
            let notification = tokio::select! {
                _ = cancel.cancelled() => break,
                n = notifications.recv() => match n {
                    Some(n) => n,
                    None => break,
                },
            };

            self.apply_notification(&mut layer_entries, notification);
        }

        debug!("Configuration watch loop terminated");
    }

    fn apply_notification(
        &self,
        layer_entries: &mut [Entries],
        notification: WatcherNotification,
    ) {
        let description = self
            .layers
            .get(notification.layer)
            .map(|cache| cache.describe());
        if description.as_deref() != Some(notification.description.as_str()) {
            error!(
                layer = notification.layer,
                description = %notification.description,
                "Notification does not match any known layer"
            );
            return;
        }

        if let Some(e) = notification.error {
            // Previous "latest" stays authoritative.
            error!(
                source = %notification.description,
                "Layer reload failed: {e}"
            );
            return;
        }
        let Some(entries) = notification.entries else {
            return;
        };

        layer_entries[notification.layer] = entries;
        let merged = merge_layers(layer_entries);

        let previous = match read_lock(&self.latest).clone() {
            Some(previous) => previous,
            None => return,
        };

        let snapshot = match Snapshot::resolve(&merged, previous.as_ref()) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(
                    source = %notification.description,
                    "Failed to resolve updated configuration: {e}"
                );
                return;
            }
        };

        if snapshot.delta.is_empty() {
            debug!(
                source = %notification.description,
                "Layer change had no effect on resolved configuration"
            );
            return;
        }

        info!(
            source = %notification.description,
            changes = snapshot.delta.len(),
            "Configuration updated"
        );

        let snapshot = Arc::new(snapshot);
        *write_lock(&self.latest) = Some(Arc::new(snapshot.values.clone()));
        let _ = self.notify_tx.send(snapshot);
    }

    /// Receive every published snapshot after this call
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Snapshot>> {
        self.notify_tx.subscribe()
    }

    /// The view produced by the initial `load`, untouched by watching
    pub fn original_values(&self) -> Result<Arc<SnapshotValues>> {
        read_lock(&self.original).clone().ok_or(ConfigError::NotLoaded)
    }

    /// The current view, replaced wholesale by the watch loop
    pub fn latest_values(&self) -> Result<Arc<SnapshotValues>> {
        read_lock(&self.latest).clone().ok_or(ConfigError::NotLoaded)
    }

    /// Decode the settings under `prefix` into `T`, against the latest view
    pub fn populate<T: Populate>(&self, prefix: &str) -> Result<T> {
        let values = self.latest_values()?;
        T::populate(values.as_ref(), prefix)
    }
}

fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

impl Values for Config {
    fn value(&self, key: &str) -> Result<Value> {
        Values::value(self.latest_values()?.as_ref(), key)
    }
}

impl ExpressionResolver for Config {
    fn resolve_by_name(&self, name: &str) -> Result<ResolvedEntry> {
        self.latest_values()?.resolve_by_name(name)
    }
}

impl PopulatorSource for Config {
    fn value(&self, key: &str) -> Result<Value> {
        Values::value(self, key)
    }

    fn values_with_prefix(&self, prefix: &str) -> SnapshotValues {
        match self.latest_values() {
            Ok(values) => values.values_with_prefix(prefix),
            Err(_) => SnapshotValues::default(),
        }
    }
}
