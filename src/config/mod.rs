//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!     → store.rs publishes it as the current snapshot
//!
//! On change:
//!     watcher.rs (or SIGHUP) sends a ReloadTrigger
//!     → store.rs reloads via loader.rs
//!     → atomic swap of Arc<AppConfig>, or keep the old one on error
//!     → on_change callback (e.g. apply new log level)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - A bad edit after startup never replaces a good snapshot

pub mod loader;
pub mod schema;
pub mod store;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{AppConfig, CacheConfig, LogConfig, StoreConfig};
pub use store::{ConfigStore, Reload, WatchHandle};
pub use watcher::{ConfigWatcher, ReloadTrigger};
