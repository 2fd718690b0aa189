use crate::{Cache, CoreError};
use async_trait::async_trait;
use moka::future::Cache as MokaCache;
use moka::Expiry;
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
struct Entry {
    bytes: Vec<u8>,
    ttl: Duration,
}

/// Expires each entry after the TTL it was written with.
struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, value: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-memory implementation of the Cache port using Moka.
/// Suitable for testing and single-process mode.
#[derive(Clone)]
pub struct InMemoryCache {
    cache: MokaCache<String, Entry>,
    default_ttl: Duration,
}

impl InMemoryCache {
    /// Creates a new InMemoryCache with a capacity and the TTL used when a
    /// write does not name one.
    pub fn new(max_capacity: u64, default_ttl_seconds: u64) -> Self {
        let cache = MokaCache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryTtl)
            .build();
        Self {
            cache,
            default_ttl: Duration::from_secs(default_ttl_seconds),
        }
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.cache.get(key).await.is_some()
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new(10_000, 300)
    }
}

impl std::fmt::Debug for InMemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCache")
            .field("entries", &self.cache.entry_count())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CoreError> {
        Ok(self.cache.get(key).await.map(|entry| entry.bytes))
    }

    async fn set(
        &self,
        key: &str,
        value: &[u8],
        ttl_seconds: Option<u64>,
    ) -> Result<(), CoreError> {
        let ttl = ttl_seconds.map(Duration::from_secs).unwrap_or(self.default_ttl);
        self.cache
            .insert(
                key.to_string(),
                Entry {
                    bytes: value.to_vec(),
                    ttl,
                },
            )
            .await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CoreError> {
        self.cache.invalidate(key).await;
        Ok(())
    }
}
