//! Configuration validation.
//!
//! Serde handles the syntactic layer; this module checks value ranges and
//! cross-field constraints. All violations are reported, not just the first.

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::AppConfig;
use crate::observability::logging::parse_level;

/// A single semantic violation in a configuration document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted key path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.port == 0 {
        errors.push(ValidationError::new("port", "must be non-zero"));
    }
    if config.request_timeout_secs == 0 {
        errors.push(ValidationError::new("request_timeout_secs", "must be non-zero"));
    }

    if let Some(address) = &config.metrics_address {
        if address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                "metrics_address",
                format!("not a socket address: {:?}", address),
            ));
        }
    }

    if parse_level(&config.log.level).is_err() {
        errors.push(ValidationError::new(
            "log.level",
            format!("unknown level {:?}", config.log.level),
        ));
    }
    if !config.log.stdout && config.log.filename.trim().is_empty() {
        errors.push(ValidationError::new("log.filename", "required unless log.stdout is set"));
    }

    if config.mysql.port == 0 {
        errors.push(ValidationError::new("mysql.port", "must be non-zero"));
    }
    if config.mysql.max_open_conns == 0 {
        errors.push(ValidationError::new("mysql.max_open_conns", "must be positive"));
    }
    if config.mysql.max_idle_conns > config.mysql.max_open_conns {
        errors.push(ValidationError::new(
            "mysql.max_idle_conns",
            "cannot exceed mysql.max_open_conns",
        ));
    }

    if config.redis.port == 0 {
        errors.push(ValidationError::new("redis.port", "must be non-zero"));
    }
    if config.redis.pool_size == 0 {
        errors.push(ValidationError::new("redis.pool_size", "must be positive"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
