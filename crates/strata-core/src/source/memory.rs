//! In-memory configuration sources
//!
//! [`StaticSource`] exposes a fixed map. [`OverrideSource`] adds a mutable
//! layer whose entries can be set and unset at runtime through an
//! [`OverrideHandle`]; mutations are queued and applied by the source's run
//! loop, signalling the notifier after each one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{Notify, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::entry::{Entries, Entry};
use crate::error::Result;
use crate::source::Source;

/// A fixed set of entries supplied at construction
pub struct StaticSource {
    name: String,
    settings: Vec<(String, String)>,
}

impl StaticSource {
    pub fn new<K, V>(name: impl Into<String>, settings: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            settings: settings
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[async_trait]
impl Source for StaticSource {
    fn describe(&self) -> String {
        self.name.clone()
    }

    async fn load(&self) -> Result<Entries> {
        Ok(self
            .settings
            .iter()
            .map(|(name, value)| Entry::new(&self.name, name, value))
            .collect())
    }
}

enum Command {
    Set(String, String),
    Unset(String),
}

/// Sends mutations to a running [`OverrideSource`]
#[derive(Clone)]
pub struct OverrideHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl OverrideHandle {
    pub fn set(&self, name: impl Into<String>, value: impl Into<String>) {
        let _ = self.commands.send(Command::Set(name.into(), value.into()));
    }

    pub fn unset(&self, name: impl Into<String>) {
        let _ = self.commands.send(Command::Unset(name.into()));
    }
}

/// A runtime-mutable entry layer
pub struct OverrideSource {
    name: String,
    settings: Mutex<HashMap<String, String>>,
    // Held across awaits by `run`, hence the tokio mutex.
    commands: tokio::sync::Mutex<mpsc::UnboundedReceiver<Command>>,
    notify: Arc<Notify>,
}

impl OverrideSource {
    pub fn new(name: impl Into<String>) -> (Arc<Self>, OverrideHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let source = Arc::new(Self {
            name: name.into(),
            settings: Mutex::new(HashMap::new()),
            commands: tokio::sync::Mutex::new(rx),
            notify: Arc::new(Notify::new()),
        });
        (source, OverrideHandle { commands: tx })
    }

    fn apply(&self, command: Command) {
        let mut settings = self.settings.lock().unwrap_or_else(|e| e.into_inner());
        match command {
            Command::Set(name, value) => {
                debug!(source = %self.name, name = %name, "Setting override");
                settings.insert(name, value);
            }
            Command::Unset(name) => {
                debug!(source = %self.name, name = %name, "Removing override");
                settings.remove(&name);
            }
        }
    }
}

#[async_trait]
impl Source for OverrideSource {
    fn describe(&self) -> String {
        self.name.clone()
    }

    async fn load(&self) -> Result<Entries> {
        let settings = self.settings.lock().unwrap_or_else(|e| e.into_inner());
        Ok(settings
            .iter()
            .map(|(name, value)| Entry::new(&self.name, name, value))
            .collect())
    }

    fn notifier(&self) -> Option<Arc<Notify>> {
        Some(Arc::clone(&self.notify))
    }

    async fn run(&self, cancel: CancellationToken) {
        let mut commands = match self.commands.try_lock() {
            Ok(rx) => rx,
            // A second run loop on the same source would starve the first;
            // refuse to start.
            Err(_) => return,
        };

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                command = commands.recv() => match command {
                    Some(command) => {
                        self.apply(command);
                        self.notify.notify_one();
                    }
                    None => return,
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value_of<'a>(entries: &'a Entries, key: &str) -> Option<&'a str> {
        entries
            .iter()
            .find(|e| e.normalized_name == key)
            .map(|e| e.value.as_str())
    }

    #[tokio::test]
    async fn test_static_source_entries() {
        let source = StaticSource::new("Defaults", [("server.port", "9211")]);
        let entries = source.load().await.unwrap();
        assert_eq!(value_of(&entries, "server.port"), Some("9211"));
    }

    #[tokio::test]
    async fn test_override_set_and_unset() {
        let (source, handle) = OverrideSource::new("Override");
        let cancel = CancellationToken::new();

        let runner = {
            let source = Arc::clone(&source);
            let cancel = cancel.clone();
            tokio::spawn(async move { source.run(cancel).await })
        };

        let notify = source.notifier().unwrap();

        handle.set("server.port", "9000");
        notify.notified().await;
        let entries = source.load().await.unwrap();
        assert_eq!(value_of(&entries, "server.port"), Some("9000"));

        handle.unset("server.port");
        notify.notified().await;
        let entries = source.load().await.unwrap();
        assert_eq!(value_of(&entries, "server.port"), None);

        cancel.cancel();
        runner.await.unwrap();
    }
}
