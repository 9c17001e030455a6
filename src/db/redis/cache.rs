use redis::AsyncCommands;
use redis::Client;

use crate::db::cache::CacheBackend;
use crate::error::AppResult;

/// Creates a Redis client for caching
///
/// Establishes a connection to Redis for fast data caching.
/// Uses connection pooling via the connection-manager feature.
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// Discovery cache backend shared by every API instance
#[derive(Clone)]
pub struct RedisCacheBackend {
    redis_client: Client,
}

impl RedisCacheBackend {
    pub fn new(redis_client: Client) -> Self {
        Self { redis_client }
    }
}

#[async_trait::async_trait]
impl CacheBackend for RedisCacheBackend {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let cached: Option<String> = conn.get(key).await?;
        Ok(cached)
    }

    /// Redis expires the key on its own; the envelope check still applies on read
    async fn set_ex(&self, key: &str, value: String, ttl: u64) -> AppResult<()> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let _: () = conn.set_ex(key, value, ttl).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

// TODO : Cover RedisCacheBackend with a mock Redis server like 'mock-redis-server' crate
