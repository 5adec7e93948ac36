//! In-memory TTL cache.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;

use super::KeyValueCache;
use crate::Result;

/// Upper bound on stored keys before TinyLFU eviction kicks in.
const MAX_ENTRIES: u64 = 100_000;

/// A cached value with its own lifetime.
#[derive(Debug, Clone)]
struct Entry {
    value: String,
    ttl: Duration,
}

/// Expires each entry after the TTL it was stored with.
struct PerEntryExpiry;

impl Expiry<String, Entry> for PerEntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &Entry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// Process-local key/value cache with per-entry expiry.
#[derive(Clone)]
pub struct MemoryCache {
    entries: Cache<String, Entry>,
}

impl MemoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(MAX_ENTRIES)
                .expire_after(PerEntryExpiry)
                .build(),
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}

#[async_trait]
impl KeyValueCache for MemoryCache {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let entry = Entry {
            value: value.to_string(),
            ttl,
        };
        self.entries.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).await.map(|entry| entry.value))
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.entries.invalidate(key).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_del() {
        let cache = MemoryCache::new();

        cache.set("k", "v", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));

        cache.del("k").await.unwrap();
        assert!(cache.get("k").await.unwrap().is_none());
        assert!(cache.get("never").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overwrite_refreshes_value() {
        let cache = MemoryCache::new();

        cache.set("k", "a", Duration::from_secs(60)).await.unwrap();
        cache.set("k", "b", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("b"));

        cache.entries.run_pending_tasks().await;
        assert_eq!(cache.entries.entry_count(), 1);
    }

    #[tokio::test]
    async fn test_zero_ttl_is_never_readable() {
        let cache = MemoryCache::new();

        cache.set("k", "v", Duration::ZERO).await.unwrap();
        assert!(cache.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_entries_have_independent_lifetimes() {
        let cache = MemoryCache::new();

        cache.set("short", "v", Duration::from_millis(10)).await.unwrap();
        cache.set("long", "v", Duration::from_secs(60)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(cache.get("short").await.unwrap().is_none());
        assert!(cache.get("long").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_expired_keys_are_dropped_without_being_read() {
        let cache = MemoryCache::new();

        for i in 0..2000 {
            cache
                .set(&format!("file_key:{i}"), "1", Duration::from_millis(1))
                .await
                .unwrap();
        }
        cache.set("kept", "1", Duration::from_secs(600)).await.unwrap();

        // Expiry is swept on the timer wheel's second-granularity ticks.
        tokio::time::sleep(Duration::from_millis(2500)).await;
        cache.entries.run_pending_tasks().await;

        assert_eq!(cache.entries.entry_count(), 1);
        assert!(cache.get("kept").await.unwrap().is_some());
    }
}
