//! Layered configuration resolution engine
//!
//! Settings are ingested from an ordered list of sources (files,
//! environment, command line, remote stores, runtime overrides), merged by
//! precedence into one flat keyspace, and resolved: every value may embed
//! `${name}` / `${name:default}` expressions referring to other settings.
//! The resolved view is an immutable snapshot; a watch loop keeps it current
//! and publishes a diff-carrying snapshot on every effective change.
//!
//! Typical usage:
//!
//! ```no_run
//! use std::sync::Arc;
//! use strata_core::{Sources, StaticSource, Values};
//!
//! # async fn example() -> strata_core::Result<()> {
//! let config = Arc::new(
//!     Sources {
//!         defaults: Some(Arc::new(StaticSource::new(
//!             "Defaults",
//!             [("server.port", "9211")],
//!         ))),
//!         ..Default::default()
//!     }
//!     .build(),
//! );
//!
//! config.load().await?;
//! let port = config.int("server.port")?;
//! # let _ = port;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod entry;
pub mod error;
pub mod expression;
pub mod populate;
pub mod snapshot;
pub mod source;
pub mod sources;
pub mod value;
pub mod watcher;

pub use config::Config;
pub use entry::{Entries, EntriesDelta, Entry, EntryDelta, normalize_key};
pub use error::{ConfigError, ErrorKind, Result};
pub use expression::{Expression, ExpressionResolver};
pub use populate::{Populate, PopulatorSource, SliceValueSource};
pub use snapshot::{
    NodeName, ResolvedEntries, ResolvedEntry, Snapshot, SnapshotDelta, SnapshotValues, Values,
};
pub use source::{
    Cache, CommandLineSource, EnvironmentSource, FileSource, KeyValueStore, OverrideHandle,
    OverrideSource, RemoteSource, Source, StaticSource, find_config_file,
};
pub use sources::{SourceFactory, SourceRegistry, Sources};
pub use value::Value;
pub use watcher::WatcherNotification;
