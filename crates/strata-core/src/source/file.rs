//! File-backed configuration source
//!
//! Supports YAML, JSON, JSON5, TOML, INI and Java-style `.properties`
//! files. Nested documents are flattened to the dotted/indexed key model:
//! nested objects become dotted paths, arrays become `[n]` indices. The
//! file extension selects the parser.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use notify::{RecursiveMode, Watcher};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::entry::{Entries, Entry, prefix_with_index, prefix_with_name};
use crate::error::{ConfigError, Result};
use crate::source::Source;

/// Extensions probed by [`find_config_file`], in priority order
pub const FILE_EXTENSIONS: [&str; 7] = [
    ".yaml",
    ".yml",
    ".ini",
    ".json",
    ".json5",
    ".properties",
    ".toml",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    Yaml,
    Json,
    Json5,
    Toml,
    Ini,
    Properties,
}

impl FileFormat {
    fn from_path(path: &Path) -> Result<FileFormat> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        match ext.as_str() {
            "yml" | "yaml" => Ok(FileFormat::Yaml),
            "json" => Ok(FileFormat::Json),
            "json5" => Ok(FileFormat::Json5),
            "toml" => Ok(FileFormat::Toml),
            "ini" => Ok(FileFormat::Ini),
            "properties" => Ok(FileFormat::Properties),
            other => Err(ConfigError::source_error(
                path.display().to_string(),
                format!("Unknown config file extension: {other:?}"),
            )),
        }
    }
}

/// A configuration source backed by one file on disk
pub struct FileSource {
    name: String,
    path: PathBuf,
    format: FileFormat,
    notify: Arc<Notify>,
}

impl FileSource {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let format = FileFormat::from_path(&path)?;

        Ok(Self {
            name: name.into(),
            path,
            format,
            notify: Arc::new(Notify::new()),
        })
    }

    fn parse(&self, content: &str) -> Result<Entries> {
        let description = self.describe();
        let wrap = |e: String| ConfigError::source_error(&description, e);

        match self.format {
            FileFormat::Yaml => {
                let doc: serde_json::Value =
                    serde_yaml::from_str(content).map_err(|e| wrap(e.to_string()))?;
                Ok(flatten_document(&description, &doc, ""))
            }
            FileFormat::Json => {
                let doc: serde_json::Value =
                    serde_json::from_str(content).map_err(|e| wrap(e.to_string()))?;
                Ok(flatten_document(&description, &doc, ""))
            }
            FileFormat::Json5 => {
                let doc: serde_json::Value =
                    json5::from_str(content).map_err(|e| wrap(e.to_string()))?;
                Ok(flatten_document(&description, &doc, ""))
            }
            FileFormat::Toml => {
                let doc: serde_json::Value =
                    toml::from_str(content).map_err(|e| wrap(e.to_string()))?;
                Ok(flatten_document(&description, &doc, ""))
            }
            FileFormat::Ini => parse_ini(&description, content),
            FileFormat::Properties => parse_properties(&description, content),
        }
    }
}

#[async_trait]
impl Source for FileSource {
    fn describe(&self) -> String {
        format!("{}: [{}]", self.name, self.path.display())
    }

    async fn load(&self) -> Result<Entries> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| ConfigError::io_error(&self.path, e))?;
        self.parse(&content)
    }

    fn notifier(&self) -> Option<Arc<Notify>> {
        Some(Arc::clone(&self.notify))
    }

    /// Watch the backing file for rewrites and signal the notifier
    async fn run(&self, cancel: CancellationToken) {
        let (tx, mut rx) = tokio::sync::mpsc::channel(1);
        let mut watcher = match notify::recommended_watcher(move |event| {
            let _ = tx.blocking_send(event);
        }) {
            Ok(w) => w,
            Err(e) => {
                error!(path = %self.path.display(), "Failed to create file watcher: {e}");
                return;
            }
        };

        if let Err(e) = watcher.watch(&self.path, RecursiveMode::NonRecursive) {
            error!(path = %self.path.display(), "Failed to watch config file: {e}");
            return;
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                event = rx.recv() => match event {
                    Some(Ok(event)) if event.kind.is_modify() || event.kind.is_create() => {
                        info!(path = %self.path.display(), "Change event received for config file");
                        self.notify.notify_one();
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => error!(path = %self.path.display(), "File watch error: {e}"),
                    None => return,
                },
            }
        }
    }
}

/// Flatten a parsed document tree into dotted/indexed entries
fn flatten_document(source: &str, value: &serde_json::Value, prefix: &str) -> Entries {
    let mut entries = Entries::default();
    visit_node(source, value, prefix, &mut entries);
    entries
}

fn visit_node(source: &str, value: &serde_json::Value, prefix: &str, out: &mut Entries) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, child) in map {
                visit_node(source, child, &prefix_with_name(prefix, key), out);
            }
        }
        serde_json::Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                visit_node(source, child, &prefix_with_index(prefix, index), out);
            }
        }
        serde_json::Value::Null => out.push(Entry::new(source, prefix, "")),
        serde_json::Value::String(s) => out.push(Entry::new(source, prefix, s)),
        scalar => out.push(Entry::new(source, prefix, scalar.to_string())),
    }
}

fn parse_ini(source: &str, content: &str) -> Result<Entries> {
    let file = ini::Ini::load_from_str(content)
        .map_err(|e| ConfigError::source_error(source, e.to_string()))?;

    let mut entries = Entries::default();
    for (section, properties) in file.iter() {
        for (key, value) in properties.iter() {
            let name = match section {
                Some(section) => prefix_with_name(section, key),
                None => key.to_string(),
            };
            entries.push(Entry::new(source, name, value));
        }
    }

    Ok(entries)
}

fn parse_properties(source: &str, content: &str) -> Result<Entries> {
    let map = java_properties::read(content.as_bytes())
        .map_err(|e| ConfigError::source_error(source, e.to_string()))?;

    let mut entries = Entries::default();
    for (key, value) in map {
        entries.push(Entry::new(source, key, value));
    }

    Ok(entries)
}

/// Probe `folders` for `base_name` with any recognized extension, returning
/// the first match in folder then extension priority order.
pub fn find_config_file(folders: &[PathBuf], base_name: &str) -> Option<PathBuf> {
    for folder in folders {
        for ext in FILE_EXTENSIONS {
            let candidate = folder.join(format!("{base_name}{ext}"));
            if candidate.is_file() {
                debug!(path = %candidate.display(), "Found config file");
                return Some(candidate);
            }
        }
    }
    None
}
