//! HTTP service bootstrap with hot-reloaded configuration.
//!
//! Loads a TOML config into a [`ConfigStore`], logs structured JSON records,
//! connects MySQL and Redis pools, and serves routes behind an access-log
//! and panic-recovery middleware pair.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod pools;

pub use config::{AppConfig, ConfigStore};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
