use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use tenantry_core::{CacheError, CacheResult, CacheStore};

/// Redis-backed cache.
///
/// The connection manager is opened on first use and shared by every
/// caller; it reconnects on its own after the server drops the link.
pub struct RedisCache {
    client: redis::Client,
    connection: OnceCell<ConnectionManager>,
}

impl RedisCache {
    /// Parse the url without touching the network.
    pub fn open(url: &str) -> CacheResult<Self> {
        let client = redis::Client::open(url).map_err(unreachable)?;
        Ok(Self {
            client,
            connection: OnceCell::new(),
        })
    }

    async fn connection(&self) -> CacheResult<ConnectionManager> {
        let manager = self
            .connection
            .get_or_try_init(|| async {
                info!("opening redis connection manager");
                self.client
                    .get_connection_manager()
                    .await
                    .map_err(unreachable)
            })
            .await?;
        Ok(manager.clone())
    }
}

fn unreachable(err: redis::RedisError) -> CacheError {
    CacheError::Unreachable(err.to_string())
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.connection().await?;
        conn.get::<_, Option<String>>(key).await.map_err(unreachable)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.connection().await?;
        // SETEX rejects 0; sub-second ttls round up.
        let seconds = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, seconds)
            .await
            .map_err(unreachable)?;
        debug!(key, seconds, "redis SETEX");
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: String, ttl: Duration) -> CacheResult<bool> {
        let mut conn = self.connection().await?;
        let seconds = ttl.as_secs().max(1);
        // SET NX EX replies nil when the key already exists.
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(seconds)
            .query_async(&mut conn)
            .await
            .map_err(unreachable)?;
        debug!(key, seconds, written = reply.is_some(), "redis SET NX");
        Ok(reply.is_some())
    }

    async fn del(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(key).await.map_err(unreachable)
    }
}
