//! Remote key/value configuration source
//!
//! [`RemoteSource`] loads entries from any [`KeyValueStore`] implementation,
//! reading a shared context and an application-specific context in turn so
//! that application settings shadow the shared ones. The run loop polls the
//! store and signals the notifier when the fetched entries change.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::entry::{Entries, Entry, merge_layers};
use crate::error::Result;
use crate::source::Source;

/// Backend contract for remote configuration stores
#[async_trait]
pub trait KeyValueStore: Send + Sync + 'static {
    fn describe(&self) -> String;

    /// List all key/value pairs under `context`, with the context prefix
    /// already stripped from the returned keys.
    async fn list(&self, context: &str) -> Result<Vec<(String, String)>>;
}

pub struct RemoteSource {
    name: String,
    store: Arc<dyn KeyValueStore>,
    default_context: String,
    application_context: String,
    poll_interval: Duration,
    last_seen: Mutex<Option<Entries>>,
    notify: Arc<Notify>,
}

impl RemoteSource {
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn KeyValueStore>,
        default_context: impl Into<String>,
        application_context: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            store,
            default_context: default_context.into(),
            application_context: application_context.into(),
            poll_interval: Duration::from_secs(30),
            last_seen: Mutex::new(None),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    async fn fetch_context(&self, context: &str) -> Result<Entries> {
        let description = self.describe();
        Ok(self
            .store
            .list(context)
            .await?
            .into_iter()
            .map(|(name, value)| Entry::new(&description, name, value))
            .collect())
    }

    async fn fetch(&self) -> Result<Entries> {
        let defaults = self.fetch_context(&self.default_context).await?;
        let application = self.fetch_context(&self.application_context).await?;
        Ok(merge_layers(&[defaults, application]))
    }
}

#[async_trait]
impl Source for RemoteSource {
    fn describe(&self) -> String {
        format!("{}: [{}]", self.name, self.store.describe())
    }

    async fn load(&self) -> Result<Entries> {
        let entries = self.fetch().await?;
        *self.last_seen.lock().unwrap_or_else(|e| e.into_inner()) = Some(entries.clone());
        Ok(entries)
    }

    fn notifier(&self) -> Option<Arc<Notify>> {
        Some(Arc::clone(&self.notify))
    }

    async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = interval.tick() => {}
            }

            let mut fetched = match self.fetch().await {
                Ok(entries) => entries,
                Err(e) => {
                    error!(source = %self.describe(), "Remote poll failed: {e}");
                    continue;
                }
            };
            fetched.sort_by_normalized_name();

            let changed = {
                let last_seen = self.last_seen.lock().unwrap_or_else(|e| e.into_inner());
                last_seen.as_ref() != Some(&fetched)
            };

            if changed {
                info!(source = %self.describe(), "Remote configuration changed");
                self.notify.notify_one();
            }
        }
    }
}
