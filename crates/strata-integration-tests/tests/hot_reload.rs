//! Watch-loop behavior: publication on effective change, silence otherwise

use std::sync::Arc;
use std::time::Duration;

use strata_core::{
    FileSource, OverrideSource, RemoteSource, Snapshot, Sources, StaticSource, Values,
};
use strata_integration_tests::{MemoryStore, init_tracing};
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

async fn next_snapshot(updates: &mut broadcast::Receiver<Arc<Snapshot>>) -> Arc<Snapshot> {
    tokio::time::timeout(Duration::from_secs(10), updates.recv())
        .await
        .expect("timed out waiting for a snapshot")
        .expect("broadcast channel closed")
}

#[tokio::test]
async fn override_change_publishes_new_snapshot() -> anyhow::Result<()> {
    init_tracing();
    let (overrides, handle) = OverrideSource::new("Override");
    let config = Arc::new(
        Sources {
            defaults: Some(Arc::new(StaticSource::new(
                "Defaults",
                [("server.port", "9211"), ("profile", "default")],
            ))),
            overrides: Some(overrides),
            ..Default::default()
        }
        .build(),
    );

    config.load().await?;
    let cancel = CancellationToken::new();
    config.watch(cancel.clone()).await?;
    let mut updates = config.subscribe();

    handle.set("server.port", "9300");
    let snapshot = next_snapshot(&mut updates).await;

    assert_eq!(snapshot.values.int("server.port")?, 9300);
    assert_eq!(snapshot.delta.len(), 1);
    assert_eq!(snapshot.delta[0].normalized_name(), "server.port");
    assert_eq!(config.int("server.port")?, 9300);

    // The untouched setting is unaffected.
    assert_eq!(config.string("profile")?, "default");

    cancel.cancel();
    Ok(())
}

#[tokio::test]
async fn file_rewrite_publishes_new_snapshot() -> anyhow::Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let path = dir.path().join("application.yaml");
    std::fs::write(&path, "server:\n  port: 9211\n")?;

    let config = Arc::new(
        Sources {
            application_file: Some(Arc::new(FileSource::new("ApplicationFile", &path)?)),
            ..Default::default()
        }
        .build(),
    );

    config.load().await?;
    let cancel = CancellationToken::new();
    config.watch(cancel.clone()).await?;
    let mut updates = config.subscribe();

    // Give the backend watcher a moment to register before rewriting.
    tokio::time::sleep(Duration::from_millis(200)).await;
    std::fs::write(&path, "server:\n  port: 9300\n")?;

    let snapshot = next_snapshot(&mut updates).await;
    assert_eq!(snapshot.values.int("server.port")?, 9300);

    cancel.cancel();
    Ok(())
}

#[tokio::test]
async fn shadowed_change_stays_silent() -> anyhow::Result<()> {
    let (overrides, handle) = OverrideSource::new("Override");
    let config = Arc::new(
        Sources {
            defaults: Some(overrides),
            // Higher precedence pins the value regardless of the override.
            command_line: Some(Arc::new(StaticSource::new(
                "CommandLine",
                [("server.port", "9999")],
            ))),
            ..Default::default()
        }
        .build(),
    );

    config.load().await?;
    let cancel = CancellationToken::new();
    config.watch(cancel.clone()).await?;
    let mut updates = config.subscribe();

    handle.set("server.port", "9300");
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert!(updates.try_recv().is_err());
    assert_eq!(config.int("server.port")?, 9999);

    cancel.cancel();
    Ok(())
}

#[tokio::test]
async fn remote_store_change_is_polled_and_published() -> anyhow::Result<()> {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    store.put("config/shared", "feature.enabled", "false");

    let remote = RemoteSource::new("Remote", Arc::clone(&store) as _, "config/shared", "config/app")
        .with_poll_interval(Duration::from_millis(50));

    let config = Arc::new(
        Sources {
            remote: vec![Arc::new(remote)],
            ..Default::default()
        }
        .build(),
    );

    config.load().await?;
    assert!(!config.bool("feature.enabled")?);

    let cancel = CancellationToken::new();
    config.watch(cancel.clone()).await?;
    let mut updates = config.subscribe();

    store.put("config/app", "feature.enabled", "true");
    let snapshot = next_snapshot(&mut updates).await;
    assert!(snapshot.values.bool("feature.enabled")?);

    cancel.cancel();
    Ok(())
}

#[tokio::test]
async fn expression_referencing_changed_setting_is_re_resolved() -> anyhow::Result<()> {
    let (overrides, handle) = OverrideSource::new("Override");
    let config = Arc::new(
        Sources {
            defaults: Some(Arc::new(StaticSource::new(
                "Defaults",
                [("listen.address", "0.0.0.0:${server.port}")],
            ))),
            overrides: Some(overrides),
            ..Default::default()
        }
        .build(),
    );

    config.load().await?;
    // Unresolvable reference interpolates as empty until the setting appears.
    assert_eq!(config.string("listen.address")?, "0.0.0.0:");

    let cancel = CancellationToken::new();
    config.watch(cancel.clone()).await?;
    let mut updates = config.subscribe();

    handle.set("server.port", "9300");
    let snapshot = next_snapshot(&mut updates).await;
    assert_eq!(snapshot.values.string("listen.address")?, "0.0.0.0:9300");

    cancel.cancel();
    Ok(())
}
