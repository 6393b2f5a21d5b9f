//! Key-value cache (Redis) connection pool.
//!
//! Holds up to `pool_size` multiplexed connections, opened on first use and
//! handed out round-robin.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use redis::aio::MultiplexedConnection;
use redis::{Client, RedisError};
use tokio::sync::OnceCell;
use url::Url;

use crate::config::CacheConfig;
use crate::pools::ConnectionError;

pub struct CachePool {
    client: Client,
    slots: Vec<OnceCell<MultiplexedConnection>>,
    next: AtomicUsize,
}

impl fmt::Debug for CachePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachePool")
            .field("size", &self.slots.len())
            .field("open", &self.open_connections())
            .finish()
    }
}

impl CachePool {
    /// Build the pool and check the server answers `PING`.
    pub async fn connect(config: &CacheConfig) -> Result<Self, ConnectionError> {
        let url = connection_url(config)?;
        let client = Client::open(url.as_str())?;
        let pool = Self {
            client,
            slots: (0..config.pool_size.max(1)).map(|_| OnceCell::new()).collect(),
            next: AtomicUsize::new(0),
        };

        let mut conn = pool.get().await?;
        let _pong: String = redis::cmd("PING").query_async(&mut conn).await?;

        tracing::info!(
            host = %config.host,
            port = config.port,
            db = config.db,
            pool_size = pool.slots.len(),
            "Cache pool ready"
        );
        Ok(pool)
    }

    /// Next connection in rotation, opening it if needed.
    pub async fn get(&self) -> Result<MultiplexedConnection, RedisError> {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.slots.len();
        self.slots[index]
            .get_or_try_init(|| self.client.get_multiplexed_async_connection())
            .await
            .cloned()
    }

    pub fn open_connections(&self) -> usize {
        self.slots.iter().filter(|s| s.initialized()).count()
    }

    /// Drop every connection held by the pool.
    pub fn close(self) {
        let open = self.open_connections();
        drop(self);
        tracing::debug!(closed = open, "Cache pool closed");
    }
}

/// `redis://[:password@]host:port/db`
pub fn connection_url(config: &CacheConfig) -> Result<Url, ConnectionError> {
    let mut url = Url::parse(&format!("redis://{}:{}/{}", config.host, config.port, config.db))
        .map_err(|e| ConnectionError::Endpoint(format!("{}:{}: {}", config.host, config.port, e)))?;
    if !config.password.is_empty() {
        url.set_password(Some(&config.password))
            .map_err(|_| ConnectionError::Endpoint(format!("{} cannot carry a password", config.host)))?;
    }
    Ok(url)
}
