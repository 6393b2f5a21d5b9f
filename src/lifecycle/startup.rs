//! Startup orchestration.
//!
//! # Order
//! 1. Load configuration (fatal on error)
//! 2. Configure the structured logger from the `[log]` section
//! 3. Install the panic hook used by the recovery middleware
//! 4. Connect the downstream pools (fatal on error)
//!
//! Listeners start last, in `main`, so traffic only arrives when ready.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::config::{AppConfig, ConfigError, ConfigStore};
use crate::http::middleware::install_panic_hook;
use crate::observability::logging::{self, parse_level, LoggingError, StructuredLogger};
use crate::pools::{ConnectionError, Pools};

/// Any error that stops the process from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("logging: {0}")]
    Logging(#[from] LoggingError),

    #[error("connection: {0}")]
    Connection(#[from] ConnectionError),
}

/// Everything initialized before the server starts.
pub struct Services {
    pub store: Arc<ConfigStore>,
    pub logger: &'static StructuredLogger,
    pub pools: Pools,
}

/// Run the startup sequence against the config file at `path`.
pub async fn bootstrap(path: &Path) -> Result<Services, StartupError> {
    let store = Arc::new(ConfigStore::open(path)?);
    let config = store.current();

    let logger = logging::init(&config.log)?;
    install_panic_hook();

    tracing::info!(
        name = %config.name,
        mode = %config.mode,
        version = %config.version,
        port = config.port,
        path = %path.display(),
        "Configuration loaded"
    );

    let pools = Pools::init(&config).await?;

    Ok(Services {
        store,
        logger,
        pools,
    })
}

/// Apply the parts of a reloaded snapshot that take effect without restart.
///
/// Only the log level is live; sink, pools and listener keep their startup
/// values.
pub fn apply_reloaded(logger: &StructuredLogger, snapshot: &AppConfig) {
    match parse_level(&snapshot.log.level) {
        Ok(level) => {
            if logger.level() == Some(level) {
                return;
            }
            match logger.set_level(level) {
                Ok(()) => tracing::info!(new_level = %level, "Log level changed"),
                Err(e) => tracing::error!(error = %e, "Failed to change log level"),
            }
        }
        Err(e) => tracing::warn!(error = %e, "Ignoring reloaded log level"),
    }
}
