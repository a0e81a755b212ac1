use redis::AsyncCommands;
use redis::Client;

use crate::db::storage::{Storage, StorageError};

/// Creates a Redis client for persistent storage
///
/// The client is cheap to clone; connections are multiplexed per operation.
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// Redis-backed record storage
///
/// Every record lives under `{prefix}{key}` with no Redis-side expiry: TTLs are
/// enforced by the cache layer so expired entries are observable and sweepable.
#[derive(Clone)]
pub struct RedisStorage {
    redis_client: Client,
    prefix: String,
}

impl RedisStorage {
    pub fn new(redis_client: Client) -> Self {
        Self::with_prefix(redis_client, "marquee:")
    }

    pub fn with_prefix(redis_client: Client, prefix: impl Into<String>) -> Self {
        Self {
            redis_client,
            prefix: prefix.into(),
        }
    }

    fn redis_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

#[async_trait::async_trait]
impl Storage for RedisStorage {
    async fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let value: Option<String> = conn.get(self.redis_key(key)).await.map_err(|e| {
            tracing::warn!(error = %e, key = %key, "Redis get failed");
            e
        })?;
        Ok(value)
    }

    async fn write(&self, key: &str, value: String) -> Result<(), StorageError> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let _: () = conn.set(self.redis_key(key), value).await.map_err(|e| {
            tracing::warn!(error = %e, key = %key, "Redis set failed");
            e
        })?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let _: () = conn.del(self.redis_key(key)).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
