//! Connection pools for downstream stores.
//!
//! # Lifecycle
//! ```text
//! startup:  Pools::init(&AppConfig)  (any error is fatal)
//! running:  handlers clone connections out of the pools
//! shutdown: Pools::close()           (exactly once)
//! ```
//!
//! Pools are sized from the snapshot in effect at startup; a config reload
//! does not resize them.

pub mod cache;
pub mod store;

use thiserror::Error;

use crate::config::AppConfig;

pub use cache::CachePool;
pub use store::StorePool;

/// Error type for pool initialization.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("store: {0}")]
    Store(#[from] sqlx::Error),

    #[error("cache: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("invalid endpoint: {0}")]
    Endpoint(String),
}

/// All downstream pools.
#[derive(Debug)]
pub struct Pools {
    pub store: StorePool,
    pub cache: CachePool,
}

impl Pools {
    /// Connect every pool. If the cache fails the store pool is closed again.
    pub async fn init(config: &AppConfig) -> Result<Self, ConnectionError> {
        let store = StorePool::connect(&config.mysql).await?;
        let cache = match CachePool::connect(&config.redis).await {
            Ok(cache) => cache,
            Err(e) => {
                store.close().await;
                return Err(e);
            }
        };
        Ok(Self { store, cache })
    }

    pub async fn close(self) {
        self.store.close().await;
        self.cache.close();
        tracing::info!("Connection pools closed");
    }
}
