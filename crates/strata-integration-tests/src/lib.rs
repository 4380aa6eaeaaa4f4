//! Shared fixtures for the strata integration tests

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use strata_core::{KeyValueStore, Result};

/// Route engine logs through a test subscriber, honoring `RUST_LOG`.
/// Safe to call from every test; only the first call installs.
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// An in-memory [`KeyValueStore`] whose contexts can be mutated mid-test to
/// exercise remote-source polling
pub struct MemoryStore {
    contexts: Mutex<BTreeMap<String, BTreeMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            contexts: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn put(&self, context: &str, key: &str, value: &str) {
        self.contexts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(context.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    pub fn remove(&self, context: &str, key: &str) {
        if let Some(entries) = self
            .contexts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(context)
        {
            entries.remove(key);
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    async fn list(&self, context: &str) -> Result<Vec<(String, String)>> {
        Ok(self
            .contexts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(context)
            .map(|entries| {
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }
}
