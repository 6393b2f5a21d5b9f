//! Configuration file watcher for hot reload.
//!
//! The watcher only reports that the file changed; loading and swapping is
//! the store's job (see [`crate::config::store`]).

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// Why a reload was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadTrigger {
    /// The watched file was written, created or renamed into place.
    FileChanged(PathBuf),
    /// An operator asked for a reload (SIGHUP).
    Signal,
}

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    trigger_tx: mpsc::UnboundedSender<ReloadTrigger>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver for reload triggers.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<ReloadTrigger>) {
        let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();
        (Self::with_sender(path, trigger_tx), trigger_rx)
    }

    /// Create a watcher feeding an existing trigger channel.
    pub fn with_sender(path: &Path, trigger_tx: mpsc::UnboundedSender<ReloadTrigger>) -> Self {
        Self {
            path: path.to_path_buf(),
            trigger_tx,
        }
    }

    /// Start watching in notify's background thread.
    ///
    /// The parent directory is watched rather than the file itself so that
    /// editors which save by renaming a temp file over the original are
    /// still observed. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.trigger_tx;
        let path = self.path.clone();
        let file_name: Option<OsString> = path.file_name().map(|n| n.to_os_string());
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !(event.kind.is_modify() || event.kind.is_create()) {
                        return;
                    }
                    let touches_file = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if touches_file {
                        tracing::debug!(path = ?path, kind = ?event.kind, "Config file change detected");
                        let _ = tx.send(ReloadTrigger::FileChanged(path.clone()));
                    }
                }
                Err(e) => tracing::error!(error = %e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}
