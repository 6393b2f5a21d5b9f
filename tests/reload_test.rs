//! Hot reload of the configuration file.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use web_app::config::{ConfigStore, ConfigWatcher, ReloadTrigger};
use web_app::lifecycle::Shutdown;

mod common;
use common::{config_toml, eventually, write_config};

#[tokio::test]
async fn test_trigger_publishes_new_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    write_config(&path, &config_toml("svc", "v1", "info"));

    let store = Arc::new(ConfigStore::open(&path).unwrap());
    let before = store.current();
    let applied = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&applied);

    let shutdown = Shutdown::new();
    let (tx, rx) = mpsc::unbounded_channel();
    let task = store.spawn_reloader(rx, shutdown.subscribe(), move |snapshot| {
        assert_eq!(snapshot.version, "v2");
        seen.fetch_add(1, Ordering::SeqCst);
    });

    write_config(&path, &config_toml("svc", "v2", "debug"));
    tx.send(ReloadTrigger::Signal).unwrap();

    assert!(eventually(Duration::from_secs(2), || store.current().version == "v2").await);
    assert_eq!(store.current().log.level, "debug");
    assert_eq!(applied.load(Ordering::SeqCst), 1);
    // a reader holding the old snapshot keeps it intact
    assert_eq!(before.version, "v1");
    assert_eq!(before.log.level, "info");

    shutdown.trigger();
    task.await.unwrap();
}

#[tokio::test]
async fn test_bad_edit_keeps_current_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    write_config(&path, &config_toml("svc", "v1", "info"));

    let store = Arc::new(ConfigStore::open(&path).unwrap());
    let applied = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&applied);

    let shutdown = Shutdown::new();
    let (tx, rx) = mpsc::unbounded_channel();
    let _task = store.spawn_reloader(rx, shutdown.subscribe(), move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    });

    write_config(&path, "name = \"svc\"\nport = [[[\n");
    tx.send(ReloadTrigger::Signal).unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(store.current().version, "v1");

    write_config(&path, &config_toml("svc", "v1", "loud"));
    tx.send(ReloadTrigger::Signal).unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(store.current().log.level, "info");
    assert_eq!(applied.load(Ordering::SeqCst), 0);

    // the next good edit still goes through
    write_config(&path, &config_toml("svc", "v3", "info"));
    tx.send(ReloadTrigger::Signal).unwrap();
    assert!(eventually(Duration::from_secs(2), || store.current().version == "v3").await);
    assert_eq!(applied.load(Ordering::SeqCst), 1);

    shutdown.trigger();
}

#[tokio::test]
async fn test_unchanged_file_does_not_notify() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    write_config(&path, &config_toml("svc", "v1", "info"));

    let store = Arc::new(ConfigStore::open(&path).unwrap());
    let before = store.current();
    let applied = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&applied);

    let shutdown = Shutdown::new();
    let (tx, rx) = mpsc::unbounded_channel();
    let _task = store.spawn_reloader(rx, shutdown.subscribe(), move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    });

    tx.send(ReloadTrigger::Signal).unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(applied.load(Ordering::SeqCst), 0);
    assert!(Arc::ptr_eq(&before, &store.current()));
    shutdown.trigger();
}

#[tokio::test]
async fn test_file_watch_reloads_on_write() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    write_config(&path, &config_toml("svc", "v1", "info"));

    let store = Arc::new(ConfigStore::open(&path).unwrap());
    let shutdown = Shutdown::new();
    let watch = store.watch(shutdown.subscribe(), |_| {}).unwrap();

    // let the watcher settle before the edit
    tokio::time::sleep(Duration::from_millis(200)).await;
    write_config(&path, &config_toml("svc", "v2", "info"));

    assert!(
        eventually(Duration::from_secs(5), || store.current().version == "v2").await,
        "file change was not picked up"
    );

    shutdown.trigger();
    watch.stop().await;
}

#[tokio::test]
async fn test_watcher_ignores_sibling_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    write_config(&path, &config_toml("svc", "v1", "info"));

    let (watcher, mut rx) = ConfigWatcher::new(&path);
    let _watcher = watcher.run().unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    write_config(&dir.path().join("other.toml"), "x = 1\n");
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(rx.try_recv().is_err());

    write_config(&path, &config_toml("svc", "v2", "info"));
    let trigger = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(trigger, ReloadTrigger::FileChanged(path.clone()));
}
