//! Relational store (MySQL) connection pool.

use std::time::Duration;

use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};

use crate::config::StoreConfig;

/// Time to wait for a free connection before giving up.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared MySQL pool. Cloning is cheap and shares the same connections.
#[derive(Debug, Clone)]
pub struct StorePool {
    pool: MySqlPool,
}

impl StorePool {
    /// Open the pool and verify the server is reachable.
    pub async fn connect(config: &StoreConfig) -> Result<Self, sqlx::Error> {
        let pool = pool_options(config)
            .connect_with(connect_options(config))
            .await
            .inspect_err(|e| {
                tracing::error!(host = %config.host, port = config.port, error = %e, "connect db failed");
            })?;

        tracing::info!(
            host = %config.host,
            port = config.port,
            database = %config.dbname,
            max_open_conns = config.max_open_conns,
            "Store pool ready"
        );
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Close every connection; waits for checked-out ones to come back.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn connect_options(config: &StoreConfig) -> MySqlConnectOptions {
    MySqlConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .password(&config.password)
        .database(&config.dbname)
}

/// `max_open_conns` caps the pool; `max_idle_conns` is the number of
/// connections kept open when idle.
fn pool_options(config: &StoreConfig) -> MySqlPoolOptions {
    MySqlPoolOptions::new()
        .max_connections(config.max_open_conns)
        // a floor, not a cap: these connections are opened up front and kept
        .min_connections(config.max_idle_conns.min(config.max_open_conns))
        .acquire_timeout(ACQUIRE_TIMEOUT)
}
