//! Conventional layer assembly
//!
//! [`Sources`] holds one slot per conventional configuration layer and turns
//! the populated slots into the ordered cache list a [`Config`] consumes,
//! lowest precedence first. [`SourceRegistry`] maps source kind names to
//! constructor functions so orchestration code can build named sources
//! without a global factory table.
//!
//! [`Config`]: crate::config::Config

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::config::Config;
use crate::error::{ConfigError, Result};
use crate::source::{Cache, Source};

/// One slot per conventional layer, in precedence order
#[derive(Default)]
pub struct Sources {
    pub defaults: Option<Arc<dyn Source>>,
    pub bootstrap_file: Option<Arc<dyn Source>>,
    pub application_file: Option<Arc<dyn Source>>,
    pub remote: Vec<Arc<dyn Source>>,
    pub profile_file: Option<Arc<dyn Source>>,
    pub environment: Option<Arc<dyn Source>>,
    pub command_line: Option<Arc<dyn Source>>,
    pub overrides: Option<Arc<dyn Source>>,
}

impl Sources {
    /// Flatten the populated slots into an ordered layer list, lowest
    /// precedence first. Empty slots are dropped.
    pub fn layers(self) -> Vec<Arc<Cache>> {
        let Sources {
            defaults,
            bootstrap_file,
            application_file,
            remote,
            profile_file,
            environment,
            command_line,
            overrides,
        } = self;

        let mut sources: Vec<Arc<dyn Source>> = Vec::new();
        sources.extend(defaults);
        sources.extend(bootstrap_file);
        sources.extend(application_file);
        sources.extend(remote);
        sources.extend(profile_file);
        sources.extend(environment);
        sources.extend(command_line);
        sources.extend(overrides);

        for source in &sources {
            debug!(source = %source.describe(), "Configuration layer registered");
        }

        sources.into_iter().map(Cache::new).collect()
    }

    pub fn build(self) -> Config {
        Config::new(self.layers())
    }
}

/// Constructor for a named source of some registered kind
pub type SourceFactory = Arc<dyn Fn(&str) -> Result<Arc<dyn Source>> + Send + Sync>;

/// Explicit kind-name to factory mapping
#[derive(Default)]
pub struct SourceRegistry {
    factories: HashMap<String, SourceFactory>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&str) -> Result<Arc<dyn Source>> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Arc::new(factory));
    }

    pub fn create(&self, kind: &str, name: &str) -> Result<Arc<dyn Source>> {
        let factory = self.factories.get(kind).ok_or_else(|| {
            ConfigError::source_error(name, format!("No source registered for kind {kind:?}"))
        })?;
        factory(name)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StaticSource;

    #[test]
    fn test_layers_preserve_precedence_order() {
        let sources = Sources {
            defaults: Some(Arc::new(StaticSource::new("Defaults", [("a", "1")]))),
            environment: Some(Arc::new(StaticSource::new("Environment", [("a", "2")]))),
            overrides: Some(Arc::new(StaticSource::new("Override", [("a", "3")]))),
            ..Default::default()
        };

        let layers = sources.layers();
        let names: Vec<String> = layers.iter().map(|c| c.describe()).collect();
        assert_eq!(names, ["Defaults", "Environment", "Override"]);
    }

    #[test]
    fn test_empty_slots_dropped() {
        assert!(Sources::default().layers().is_empty());
    }

    #[test]
    fn test_registry_creates_registered_kind() {
        let mut registry = SourceRegistry::new();
        registry.register("static", |name| {
            Ok(Arc::new(StaticSource::new(name, [("x", "1")])) as Arc<dyn Source>)
        });

        let source = registry.create("static", "Defaults").unwrap();
        assert_eq!(source.describe(), "Defaults");

        let err = registry.create("consul", "Remote").err().unwrap();
        assert!(err.to_string().contains("consul"));
    }
}
