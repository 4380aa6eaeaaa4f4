//! Source contract and the caching decorator
//!
//! A source is a named producer of raw entries for one origin. Sources that
//! can observe their backend expose a notifier and a background `run` loop;
//! purely static sources implement only `load`.

mod command_line;
mod env;
mod file;
mod memory;
mod remote;

pub use command_line::CommandLineSource;
pub use env::EnvironmentSource;
pub use file::{FileSource, find_config_file};
pub use memory::{OverrideHandle, OverrideSource, StaticSource};
pub use remote::{KeyValueStore, RemoteSource};

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::entry::Entries;
use crate::error::Result;

/// A named producer of raw `(key, value)` pairs for one origin
#[async_trait]
pub trait Source: Send + Sync + 'static {
    /// Human-readable description used in logs and error messages
    fn describe(&self) -> String;

    /// Produce the current entry set. Called on every (non-cached) read.
    async fn load(&self) -> Result<Entries>;

    /// Change-notification signal, for sources that can observe their
    /// backend. `None` means the source never changes on its own.
    fn notifier(&self) -> Option<Arc<Notify>> {
        None
    }

    /// Background loop for sources that must poll or long-poll a backend.
    /// Runs until the token is cancelled. The default does nothing.
    async fn run(&self, _cancel: CancellationToken) {}
}

/// Caching decorator over a source.
///
/// The first `load` performs real I/O and remembers the result; subsequent
/// loads return the remembered entries until `invalidate` is called (by the
/// layer watcher, on a change notification).
pub struct Cache {
    source: Arc<dyn Source>,
    cached: Mutex<Option<Entries>>,
}

impl Cache {
    pub fn new(source: Arc<dyn Source>) -> Arc<Self> {
        Arc::new(Self {
            source,
            cached: Mutex::new(None),
        })
    }

    pub fn describe(&self) -> String {
        self.source.describe()
    }

    /// The wrapped source, for spawning its background loop
    pub fn source(&self) -> Arc<dyn Source> {
        Arc::clone(&self.source)
    }

    pub fn notifier(&self) -> Option<Arc<Notify>> {
        self.source.notifier()
    }

    /// Drop the remembered entries so the next `load` performs fresh I/O
    pub fn invalidate(&self) {
        self.cached.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    pub async fn load(&self) -> Result<Entries> {
        if let Some(entries) = self.cached.lock().unwrap_or_else(|e| e.into_inner()).clone() {
            return Ok(entries);
        }

        let entries = self.source.load().await?;

        // An empty source is worth flagging but is not itself a failure;
        // an empty remote prefix is routine.
        if entries.is_empty() {
            warn!(source = %self.describe(), "Loaded 0 entries");
        } else {
            debug!(source = %self.describe(), count = entries.len(), "Loaded entries");
        }

        *self.cached.lock().unwrap_or_else(|e| e.into_inner()) = Some(entries.clone());
        Ok(entries)
    }
}
