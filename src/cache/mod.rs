//! Cache layer
//!
//! In-process moka cache for read-mostly lookups such as the subject list
//! and the public catalogue. Writers invalidate by key or key prefix.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::CacheConfig;

pub use memory::MemoryCache;

/// The cache used by the services
pub type Cache = MemoryCache;

/// Cache layer trait
///
/// Generic over the cached value, so it is used through concrete types
/// rather than as a trait object.
#[async_trait]
pub trait CacheLayer: Send + Sync {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>>;

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete every key starting with `prefix`
    async fn delete_prefix(&self, prefix: &str) -> Result<()>;
}

/// Create the cache described by `config`
pub fn create_cache(config: &CacheConfig) -> Arc<Cache> {
    let ttl = Duration::from_secs(config.ttl_seconds);
    tracing::debug!("Creating memory cache (ttl {:?}, max {} entries)", ttl, config.max_entries);
    Arc::new(MemoryCache::with_capacity_and_ttl(config.max_entries, ttl))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_cache_from_config() {
        let config = CacheConfig {
            ttl_seconds: 1800,
            max_entries: 10,
        };
        let cache = create_cache(&config);
        assert_eq!(cache.ttl(), Duration::from_secs(1800));

        cache.set("key", &"value".to_string()).await.unwrap();
        let result: Option<String> = cache.get("key").await.unwrap();
        assert_eq!(result, Some("value".to_string()));

        cache.delete("key").await.unwrap();
        assert_eq!(cache.get::<String>("key").await.unwrap(), None);
    }
}
