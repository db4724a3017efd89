//! Response cache manager.

use super::key::CacheKey;
use crate::storage::Storage;
use crate::types::ResponseEnvelope;
use crate::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub evictions: u64,
    pub errors: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    evictions: AtomicU64,
    errors: AtomicU64,
}

impl AtomicStats {
    fn to_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Best-effort cache of successful envelopes, keyed by URL, on top of the session
/// storage area.
///
/// Nothing here ever fails a call: read errors are misses and write errors are
/// logged and dropped.
pub struct ResponseCache {
    storage: Arc<dyn Storage>,
    stats: AtomicStats,
}

impl ResponseCache {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            stats: AtomicStats::default(),
        }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub async fn get(&self, key: &CacheKey) -> Option<ResponseEnvelope> {
        match self.storage.get(key.as_str()).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(envelope) => {
                    self.stats.hits.fetch_add(1, Ordering::Relaxed);
                    Some(envelope)
                }
                Err(e) => {
                    debug!(key = %key, error = %e, "discarding undecodable cache entry");
                    self.stats.errors.fetch_add(1, Ordering::Relaxed);
                    self.stats.misses.fetch_add(1, Ordering::Relaxed);
                    None
                }
            },
            Ok(None) => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                debug!(key = %key, error = %e, "cache read failed");
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store `envelope` under `key`. When the area is full, drop the oldest quarter
    /// of its entries and try once more.
    pub async fn put(&self, key: &CacheKey, envelope: &ResponseEnvelope) {
        let raw = match serde_json::to_string(envelope) {
            Ok(raw) => raw,
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %e, "could not serialize envelope for cache");
                return;
            }
        };

        let result = match self.storage.set(key.as_str(), &raw).await {
            Err(e) if e.is_storage_full() => match self.evict_oldest_quarter().await {
                Ok(_) => self.storage.set(key.as_str(), &raw).await,
                Err(evict_err) => Err(evict_err),
            },
            other => other,
        };

        match result {
            Ok(()) => {
                self.stats.sets.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, error = %e, "cache write dropped");
            }
        }
    }

    /// Remove the first `floor(len / 4)` entries in insertion order.
    async fn evict_oldest_quarter(&self) -> Result<usize> {
        let keys = self.storage.keys().await?;
        let count = keys.len() / 4;
        for key in keys.iter().take(count) {
            self.storage.remove(key).await?;
        }
        self.stats
            .evictions
            .fetch_add(count as u64, Ordering::Relaxed);
        debug!(evicted = count, remaining = keys.len() - count, "session storage full, evicted oldest entries");
        Ok(count)
    }

    pub async fn clear(&self) -> Result<()> {
        self.storage.clear().await
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.to_stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use serde_json::json;

    fn envelope(n: u32) -> ResponseEnvelope {
        ResponseEnvelope::new(200, "", json!({ "n": n }), "4.5.0.0")
    }

    #[tokio::test]
    async fn round_trips_and_counts() {
        let cache = ResponseCache::new(Arc::new(MemoryStorage::unbounded()));
        let key = CacheKey::new("/api/v4/search/alert/?q=*");
        assert!(cache.get(&key).await.is_none());
        cache.put(&key, &envelope(1)).await;
        assert_eq!(cache.get(&key).await, Some(envelope(1)));
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.sets), (1, 1, 1));
        assert!((stats.hit_ratio() - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn full_store_evicts_oldest_quarter_then_writes() {
        let probe = serde_json::to_string(&envelope(0)).unwrap();
        let per_entry = "/u/00".len() + probe.len();
        // Exactly nine entries fit.
        let storage = Arc::new(MemoryStorage::new(per_entry * 9));
        let cache = ResponseCache::new(storage.clone());
        for i in 0..9 {
            cache.put(&CacheKey::new(format!("/u/{i:02}")), &envelope(0)).await;
        }
        assert_eq!(storage.len().await.unwrap(), 9);

        cache.put(&CacheKey::new("/u/99"), &envelope(0)).await;

        // floor(9 / 4) = 2 oldest removed, then the new entry stored.
        let keys = storage.keys().await.unwrap();
        assert_eq!(keys.len(), 8);
        assert_eq!(keys.first().map(String::as_str), Some("/u/02"));
        assert_eq!(keys.last().map(String::as_str), Some("/u/99"));
        assert_eq!(cache.stats().evictions, 2);
    }

    #[tokio::test]
    async fn second_failure_is_swallowed() {
        let storage = Arc::new(MemoryStorage::new(16));
        let cache = ResponseCache::new(storage.clone());
        cache.put(&CacheKey::new("/big"), &envelope(1)).await;
        assert_eq!(storage.len().await.unwrap(), 0);
        assert_eq!(cache.stats().errors, 1);
    }

    #[tokio::test]
    async fn undecodable_entry_is_a_miss() {
        let storage = Arc::new(MemoryStorage::unbounded());
        storage.set("/broken", "{not json").await.unwrap();
        let cache = ResponseCache::new(storage);
        assert!(cache.get(&CacheKey::new("/broken")).await.is_none());
        assert_eq!(cache.stats().errors, 1);
    }
}
