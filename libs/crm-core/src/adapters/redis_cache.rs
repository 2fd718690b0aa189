use crate::{Cache, CoreError};
use async_trait::async_trait;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use tracing::info;

/// Redis implementation of the Cache port, shared by every process serving
/// the same tenants.
#[derive(Clone)]
pub struct RedisCache {
    connection: MultiplexedConnection,
    default_ttl_seconds: u64,
}

impl RedisCache {
    /// Creates a new RedisCache and connects to the server.
    pub async fn new(redis_url: &str, default_ttl_seconds: u64) -> Result<Self, CoreError> {
        let client = Client::open(redis_url)
            .map_err(|e| CoreError::Configuration(format!("Invalid Redis URL: {}", e)))?;
        let connection = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(CoreError::infrastructure)?;
        info!("Redis cache connected.");
        Ok(Self {
            connection,
            default_ttl_seconds,
        })
    }
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("default_ttl_seconds", &self.default_ttl_seconds)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CoreError> {
        let mut conn = self.connection.clone();
        conn.get(key).await.map_err(CoreError::infrastructure)
    }

    async fn set(
        &self,
        key: &str,
        value: &[u8],
        ttl_seconds: Option<u64>,
    ) -> Result<(), CoreError> {
        let mut conn = self.connection.clone();
        let ttl = ttl_seconds.unwrap_or(self.default_ttl_seconds);

        conn.set_ex(key, value, ttl)
            .await
            .map_err(CoreError::infrastructure)
    }

    async fn delete(&self, key: &str) -> Result<(), CoreError> {
        let mut conn = self.connection.clone();
        conn.del(key)
            .await
            .map(|_: usize| ())
            .map_err(CoreError::infrastructure)
    }

    /// Single multi-key DEL.
    async fn delete_many(&self, keys: &[String]) -> Result<(), CoreError> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection.clone();
        conn.del(keys)
            .await
            .map(|_: usize| ())
            .map_err(CoreError::infrastructure)
    }
}

// --- Integration Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use testcontainers::runners::AsyncRunner;
    use testcontainers::ContainerAsync;
    use testcontainers_modules::redis::Redis as RedisImage;
    use tokio::time::sleep;

    async fn setup_redis(default_ttl_seconds: u64) -> (RedisCache, ContainerAsync<RedisImage>) {
        let node = RedisImage::default()
            .start()
            .await
            .expect("Failed to start Redis container");
        let port = node
            .get_host_port_ipv4(6379)
            .await
            .expect("Failed to get host port");
        let redis_url = format!("redis://localhost:{}/", port);

        let cache = RedisCache::new(&redis_url, default_ttl_seconds)
            .await
            .expect("Failed to connect to testcontainer Redis");
        (cache, node)
    }

    #[tokio::test]
    #[ignore = "requires docker"]
    async fn test_set_and_get_redis() {
        let (cache, _node) = setup_redis(3600).await;
        let key = "crm:v1:acme:clients:id:1";
        let value = b"{\"name\":\"Acme\"}".to_vec();

        cache.set(key, &value, None).await.expect("SET failed");
        assert_eq!(cache.get(key).await.expect("GET failed"), Some(value));
        assert_eq!(cache.get("crm:v1:acme:clients:id:2").await.expect("GET failed"), None);
    }

    #[tokio::test]
    #[ignore = "requires docker"]
    async fn test_delete_many_redis() {
        let (cache, _node) = setup_redis(3600).await;
        for key in ["a", "b", "c"] {
            cache.set(key, b"v", None).await.expect("SET failed");
        }

        cache
            .delete_many(&["a".to_string(), "b".to_string(), "missing".to_string()])
            .await
            .expect("DEL failed");

        assert_eq!(cache.get("a").await.unwrap(), None);
        assert_eq!(cache.get("b").await.unwrap(), None);
        assert_eq!(cache.get("c").await.unwrap(), Some(b"v".to_vec()));
        cache.delete_many(&[]).await.expect("empty DEL failed");
    }

    #[tokio::test]
    #[ignore = "requires docker"]
    async fn test_set_with_ttl_redis() {
        let (cache, _node) = setup_redis(3600).await;
        cache.set("short", b"v", Some(1)).await.expect("SET failed");
        assert_eq!(cache.get("short").await.unwrap(), Some(b"v".to_vec()));

        sleep(Duration::from_millis(1100)).await;
        assert_eq!(
            cache.get("short").await.unwrap(),
            None,
            "Cache entry should have expired"
        );
    }
}
