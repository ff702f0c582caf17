// src/middleware/cache.rs
use axum::async_trait;
use moka::future::Cache;
use moka::Expiry;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::storage::StoreError;

/// Generic key/value cache with per-entry expiry.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    async fn put(&self, key: &str, value: Value, ttl: Duration) -> Result<(), StoreError>;
    /// Atomically adds one to a numeric entry (missing counts as 0) and
    /// restarts its TTL; returns the new count.
    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, StoreError>;
}

#[derive(Clone)]
struct CacheEntry {
    value: Value,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, CacheEntry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, value: &CacheEntry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

#[derive(Clone)]
pub struct CacheService {
    entries: Arc<Cache<String, CacheEntry>>,
}

impl CacheService {
    pub fn new(max_capacity: u64) -> Self {
        Self {
            entries: Arc::new(
                Cache::builder()
                    .max_capacity(max_capacity)
                    .expire_after(PerEntryTtl)
                    .build(),
            ),
        }
    }
}

impl Default for CacheService {
    fn default() -> Self {
        Self::new(100_000)
    }
}

#[async_trait]
impl CacheStore for CacheService {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.entries.get(key).await.map(|entry| entry.value))
    }

    async fn put(&self, key: &str, value: Value, ttl: Duration) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), CacheEntry { value, ttl }).await;
        Ok(())
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        let entry = self
            .entries
            .entry(key.to_string())
            .and_upsert_with(|existing| {
                let current = existing
                    .and_then(|e| e.into_value().value.as_u64())
                    .unwrap_or(0);
                std::future::ready(CacheEntry {
                    value: Value::from(current + 1),
                    ttl,
                })
            })
            .await;

        entry
            .into_value()
            .value
            .as_u64()
            .ok_or_else(|| StoreError::Malformed(format!("non-numeric counter at {}", key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_and_get() {
        let cache = CacheService::new(100);
        cache.put("k", json!({"a": 1}), Duration::from_secs(60)).await.unwrap();

        assert_eq!(cache.get("k").await.unwrap(), Some(json!({"a": 1})));
        assert_eq!(cache.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_increment_counts_from_zero() {
        let cache = CacheService::new(100);
        let ttl = Duration::from_secs(60);

        assert_eq!(cache.increment("hits", ttl).await.unwrap(), 1);
        assert_eq!(cache.increment("hits", ttl).await.unwrap(), 2);
        assert_eq!(cache.increment("hits", ttl).await.unwrap(), 3);
        assert_eq!(cache.get("hits").await.unwrap(), Some(json!(3)));
    }

    #[tokio::test]
    async fn test_increment_replaces_non_numeric() {
        let cache = CacheService::new(100);
        let ttl = Duration::from_secs(60);
        cache.put("k", json!("text"), ttl).await.unwrap();

        assert_eq!(cache.increment("k", ttl).await.unwrap(), 1);
    }
}
