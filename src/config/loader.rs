//! Configuration loading from disk.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::AppConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file {} not found", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed config {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config {}: {}", path.display(), join(errors))]
    Invalid {
        path: PathBuf,
        errors: Vec<ValidationError>,
    },
}

impl ConfigError {
    /// True for documents that were read but could not be accepted.
    pub fn is_malformed(&self) -> bool {
        matches!(self, ConfigError::Malformed { .. } | ConfigError::Invalid { .. })
    }
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => ConfigError::NotFound {
            path: path.to_path_buf(),
        },
        _ => ConfigError::Read {
            path: path.to_path_buf(),
            source,
        },
    })?;

    parse_config(&content).map_err(|e| e.at(path))
}

/// Parse and validate a configuration document held in memory.
pub fn parse_config(content: &str) -> Result<AppConfig, UnplacedError> {
    let config: AppConfig = toml::from_str(content).map_err(UnplacedError::Malformed)?;
    validate_config(&config).map_err(UnplacedError::Invalid)?;
    Ok(config)
}

/// A parse failure not yet attributed to a file.
#[derive(Debug)]
pub enum UnplacedError {
    Malformed(toml::de::Error),
    Invalid(Vec<ValidationError>),
}

impl UnplacedError {
    fn at(self, path: &Path) -> ConfigError {
        let path = path.to_path_buf();
        match self {
            UnplacedError::Malformed(source) => ConfigError::Malformed { path, source },
            UnplacedError::Invalid(errors) => ConfigError::Invalid { path, errors },
        }
    }
}
