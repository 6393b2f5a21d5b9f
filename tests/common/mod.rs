//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tracing_subscriber::fmt::MakeWriter;
use web_app::config::{AppConfig, ConfigStore};

/// In-memory log sink; every record the production encoder writes lands here.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// Parsed records, one per line.
    pub fn records(&self) -> Vec<Value> {
        let bytes = self.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    /// Records at the given level ("INFO", "ERROR", ...).
    pub fn at_level(&self, level: &str) -> Vec<Value> {
        self.records()
            .into_iter()
            .filter(|r| r["level"] == level)
            .collect()
    }
}

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

pub fn snapshot(name: &str, version: &str) -> AppConfig {
    AppConfig {
        name: name.into(),
        version: version.into(),
        ..AppConfig::default()
    }
}

/// A store that never touches the filesystem.
pub fn memory_store(config: AppConfig) -> Arc<ConfigStore> {
    Arc::new(ConfigStore::from_config("unused.toml", config))
}

/// Render a config file the way an operator would write one.
pub fn config_toml(name: &str, version: &str, level: &str) -> String {
    format!(
        r#"name = "{name}"
mode = "dev"
version = "{version}"
port = 8081

[log]
level = "{level}"
stdout = true
"#
    )
}

pub fn write_config(path: &Path, content: &str) {
    std::fs::write(path, content).unwrap();
}

/// Poll `check` until it holds or `timeout` elapses.
pub async fn eventually<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
