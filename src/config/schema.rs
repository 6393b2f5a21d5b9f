//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration snapshot.
///
/// A loaded `AppConfig` is never mutated; reloads build a new value and swap
/// it in whole (see [`crate::config::ConfigStore`]).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// Service name.
    pub name: String,

    /// Run mode (e.g. "dev", "release").
    pub mode: String,

    /// Service version string.
    pub version: String,

    /// HTTP listen port.
    pub port: u16,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Prometheus exporter bind address. Disabled when unset.
    pub metrics_address: Option<String>,

    /// Logging policy.
    pub log: LogConfig,

    /// Relational store connection settings.
    pub mysql: StoreConfig,

    /// Key-value cache connection settings.
    pub redis: CacheConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "web_app".to_string(),
            mode: "dev".to_string(),
            version: "v0.0.1".to_string(),
            port: 8081,
            request_timeout_secs: 30,
            metrics_address: None,
            log: LogConfig::default(),
            mysql: StoreConfig::default(),
            redis: CacheConfig::default(),
        }
    }
}

impl AppConfig {
    /// Address the HTTP listener binds to.
    pub fn bind_address(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// Minimum level (trace, debug, info, warn, error).
    pub level: String,

    /// Log file path. Ignored when `stdout` is set.
    pub filename: String,

    /// Size hint for a single log file in megabytes.
    pub max_size: u64,

    /// Days to retain rotated files.
    pub max_age: u64,

    /// Number of rotated files to keep.
    pub max_backups: usize,

    /// Include stack text in recovery logs.
    pub verbose: bool,

    /// Write to stdout instead of a file.
    pub stdout: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            filename: "web_app.log".to_string(),
            max_size: 200,
            max_age: 30,
            max_backups: 7,
            verbose: true,
            stdout: false,
        }
    }
}

/// MySQL connection pool settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,

    /// Upper bound on open connections.
    pub max_open_conns: u32,

    /// Connections kept open while idle.
    pub max_idle_conns: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3306,
            user: "root".to_string(),
            password: String::new(),
            dbname: "web_app".to_string(),
            max_open_conns: 200,
            max_idle_conns: 50,
        }
    }
}

/// Redis connection pool settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub host: String,
    pub port: u16,
    pub password: String,

    /// Logical database index.
    pub db: i64,

    /// Number of multiplexed connections to open.
    pub pool_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: String::new(),
            db: 0,
            pool_size: 100,
        }
    }
}
