//! Process-wide configuration store with atomic hot reload.
//!
//! Readers call [`ConfigStore::current`] and get an `Arc` to a complete
//! snapshot. A reload builds an entirely new [`AppConfig`] and publishes it
//! with a single pointer swap, so a reader sees either the old or the new
//! snapshot and never a mix of the two.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::{ArcSwap, Guard};
use notify::RecommendedWatcher;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::config::loader::{load_config, ConfigError};
use crate::config::schema::AppConfig;
use crate::config::watcher::{ConfigWatcher, ReloadTrigger};

/// Quiet period used to coalesce bursts of file events from a single save.
const DEBOUNCE: Duration = Duration::from_millis(100);

/// Result of a successful reload attempt.
#[derive(Debug, Clone)]
pub enum Reload {
    /// A different snapshot was published.
    Applied(Arc<AppConfig>),
    /// The file parsed to the snapshot already in effect.
    Unchanged,
}

/// Holds the current configuration snapshot.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    current: ArcSwap<AppConfig>,
}

impl ConfigStore {
    /// Load the initial snapshot. Failure here should stop startup.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let config = load_config(&path)?;
        Ok(Self::from_config(path, config))
    }

    /// Build a store around an already loaded snapshot.
    pub fn from_config(path: impl Into<PathBuf>, config: AppConfig) -> Self {
        Self {
            path: path.into(),
            current: ArcSwap::from_pointee(config),
        }
    }

    /// Path the store reloads from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot currently in effect.
    pub fn current(&self) -> Arc<AppConfig> {
        self.current.load_full()
    }

    /// Borrow the current snapshot without touching the refcount.
    ///
    /// Hold the guard only briefly; use [`current`](Self::current) across
    /// await points.
    pub fn peek(&self) -> Guard<Arc<AppConfig>> {
        self.current.load()
    }

    /// Publish `config` and return the snapshot it replaced.
    pub fn replace(&self, config: AppConfig) -> Arc<AppConfig> {
        self.current.swap(Arc::new(config))
    }

    /// Re-read the file and publish it if it differs from the current one.
    ///
    /// On error the current snapshot stays in effect.
    pub fn reload(&self) -> Result<Reload, ConfigError> {
        let next = load_config(&self.path)?;
        if *self.current.load().as_ref() == next {
            return Ok(Reload::Unchanged);
        }
        let next = Arc::new(next);
        self.current.store(Arc::clone(&next));
        Ok(Reload::Applied(next))
    }

    /// Consume reload triggers until the channel closes or shutdown fires.
    ///
    /// `on_change` runs after each newly published snapshot.
    pub fn spawn_reloader<F>(
        self: &Arc<Self>,
        mut triggers: mpsc::UnboundedReceiver<ReloadTrigger>,
        mut shutdown: broadcast::Receiver<()>,
        on_change: F,
    ) -> JoinHandle<()>
    where
        F: Fn(&AppConfig) + Send + 'static,
    {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let trigger = tokio::select! {
                    trigger = triggers.recv() => match trigger {
                        Some(t) => t,
                        None => break,
                    },
                    _ = shutdown.recv() => break,
                };

                tokio::time::sleep(DEBOUNCE).await;
                while triggers.try_recv().is_ok() {}

                match store.reload() {
                    Ok(Reload::Applied(snapshot)) => {
                        tracing::info!(
                            trigger = ?trigger,
                            version = %snapshot.version,
                            "Configuration reloaded"
                        );
                        on_change(&snapshot);
                    }
                    Ok(Reload::Unchanged) => {
                        tracing::debug!(trigger = ?trigger, "Configuration unchanged");
                    }
                    Err(e) => {
                        tracing::error!(
                            trigger = ?trigger,
                            error = %e,
                            "Failed to reload config. Keeping current configuration."
                        );
                    }
                }
            }
            tracing::debug!("Config reloader stopped");
        })
    }

    /// Watch the backing file and hot-reload on every change.
    pub fn watch<F>(
        self: &Arc<Self>,
        shutdown: broadcast::Receiver<()>,
        on_change: F,
    ) -> Result<WatchHandle, notify::Error>
    where
        F: Fn(&AppConfig) + Send + 'static,
    {
        let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();
        let watcher = ConfigWatcher::with_sender(&self.path, trigger_tx.clone()).run()?;
        let task = self.spawn_reloader(trigger_rx, shutdown, on_change);
        Ok(WatchHandle {
            _watcher: watcher,
            trigger_tx,
            task,
        })
    }
}

/// Keeps a file watch alive. Dropping it stops file notifications.
pub struct WatchHandle {
    _watcher: RecommendedWatcher,
    trigger_tx: mpsc::UnboundedSender<ReloadTrigger>,
    task: JoinHandle<()>,
}

impl WatchHandle {
    /// Sender for additional reload sources such as SIGHUP.
    pub fn triggers(&self) -> mpsc::UnboundedSender<ReloadTrigger> {
        self.trigger_tx.clone()
    }

    /// Stop watching and wait for the reload task to finish.
    pub async fn stop(self) {
        let WatchHandle { _watcher, trigger_tx, task } = self;
        drop(_watcher);
        drop(trigger_tx);
        let _ = task.await;
    }
}
