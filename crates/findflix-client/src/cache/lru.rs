use std::sync::Arc;

use indexmap::IndexMap;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{
    stats::{CacheEvent, CacheStats},
    store::KeyValueStore,
};

pub const DEFAULT_CAPACITY: usize = 50;

/// Bounded least-recently-used cache mirrored to a durable store.
///
/// Map order is recency order: the first entry is the least recently used,
/// the last one the most recently used. Hits move an entry to the back and
/// inserts evict from the front. The whole map is written to the store after
/// every mutation; the in-memory map stays authoritative when that fails.
#[derive(Debug)]
pub struct ResultCache<T> {
    entries: Mutex<IndexMap<String, T>>,
    capacity: usize,
    store: Arc<dyn KeyValueStore>,
    stats: CacheStats,
}

impl<T> ResultCache<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync,
{
    /// Empty cache that ignores whatever the store currently holds.
    pub fn empty(store: Arc<dyn KeyValueStore>, capacity: usize) -> Self {
        Self {
            entries: Mutex::new(IndexMap::new()),
            capacity: capacity.max(1),
            store,
            stats: CacheStats::new(),
        }
    }

    /// Builds the cache from the store's blob. Unreadable or malformed data
    /// yields an empty cache.
    pub async fn hydrate(store: Arc<dyn KeyValueStore>, capacity: usize) -> Self {
        let cache = Self::empty(store, capacity);
        let loaded = match cache.store.read_all().await {
            Ok(Some(blob)) => match serde_json::from_slice::<IndexMap<String, T>>(&blob) {
                Ok(entries) => entries,
                Err(error) => {
                    cache.stats.record(CacheEvent::Corrupt);
                    warn!(target: "findflix_cache", %error, "discarding malformed persisted cache");
                    IndexMap::new()
                }
            },
            Ok(None) => IndexMap::new(),
            Err(error) => {
                cache.stats.record(CacheEvent::ReadFailed);
                warn!(target: "findflix_cache", %error, "failed to read persisted cache");
                IndexMap::new()
            }
        };

        {
            let mut entries = cache.entries.lock().await;
            *entries = loaded;
            let overflow = entries.len().saturating_sub(cache.capacity);
            if overflow > 0 {
                entries.drain(..overflow);
            }
            cache.stats.set_entries(entries.len());
            debug!(target: "findflix_cache", entries = entries.len(), "hydrated result cache");
        }
        cache
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Returns the cached payload and marks it most recently used.
    pub async fn get(&self, key: &str) -> Option<T> {
        let mut entries = self.entries.lock().await;
        let Some(value) = entries.shift_remove(key) else {
            self.stats.record(CacheEvent::Miss);
            return None;
        };
        entries.insert(key.to_string(), value.clone());
        self.stats.record(CacheEvent::Hit);
        self.persist(&entries).await;
        Some(value)
    }

    /// Inserts or overwrites `key` as most recently used, then evicts from
    /// the least recently used end until the cache fits its capacity.
    pub async fn put(&self, key: impl Into<String>, value: T) {
        let key = key.into();
        let mut entries = self.entries.lock().await;
        entries.shift_remove(&key);
        entries.insert(key, value);

        let mut evicted = 0;
        while entries.len() > self.capacity {
            if let Some((oldest, _)) = entries.shift_remove_index(0) {
                debug!(target: "findflix_cache", key = %oldest, "evicted least recently used entry");
                evicted += 1;
            }
        }
        if evicted > 0 {
            self.stats.record(CacheEvent::Evicted(evicted));
        }
        self.stats.set_entries(entries.len());
        self.persist(&entries).await;
    }

    /// Membership test that does not touch recency.
    pub async fn contains(&self, key: &str) -> bool {
        self.entries.lock().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Keys from least to most recently used.
    pub async fn keys(&self) -> Vec<String> {
        self.entries.lock().await.keys().cloned().collect()
    }

    pub async fn clear(&self) {
        let mut entries = self.entries.lock().await;
        entries.clear();
        self.stats.set_entries(0);
        self.persist(&entries).await;
    }

    async fn persist(&self, entries: &IndexMap<String, T>) {
        let blob = match serde_json::to_vec(entries) {
            Ok(blob) => blob,
            Err(error) => {
                self.stats.record(CacheEvent::EncodeFailed);
                warn!(target: "findflix_cache", %error, "failed to serialize result cache");
                return;
            }
        };
        if let Err(error) = self.store.write_all(&blob).await {
            self.stats.record(CacheEvent::WriteFailed);
            warn!(target: "findflix_cache", %error, "failed to persist result cache");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::MemoryStore;

    fn fresh(capacity: usize) -> (Arc<MemoryStore>, ResultCache<u32>) {
        let store = Arc::new(MemoryStore::new());
        let cache = ResultCache::empty(store.clone(), capacity);
        (store, cache)
    }

    #[tokio::test]
    async fn evicts_least_recently_used_beyond_capacity() {
        let (_, cache) = fresh(DEFAULT_CAPACITY);
        for index in 0..51 {
            cache.put(format!("key-{index}"), index).await;
        }

        assert_eq!(cache.len().await, 50);
        assert!(!cache.contains("key-0").await);
        assert!(cache.contains("key-1").await);
        assert!(cache.contains("key-50").await);
        assert_eq!(cache.stats().snapshot().evictions, 1);
    }

    #[tokio::test]
    async fn read_promotes_entry_out_of_eviction_order() {
        let (_, cache) = fresh(DEFAULT_CAPACITY);
        for index in 0..50 {
            cache.put(format!("key-{index}"), index).await;
        }

        assert_eq!(cache.get("key-0").await, Some(0));

        cache.put("key-50", 50).await;
        assert!(cache.contains("key-0").await);
        assert!(!cache.contains("key-1").await, "next-oldest untouched key goes first");

        for index in 51..99 {
            cache.put(format!("key-{index}"), index).await;
        }
        assert!(cache.contains("key-0").await, "promoted key survives 49 inserts");
        assert_eq!(cache.len().await, 50);
        assert_eq!(cache.keys().await.first().map(String::as_str), Some("key-0"));
    }

    #[tokio::test]
    async fn overwrite_refreshes_recency_without_growing() {
        let (_, cache) = fresh(2);
        cache.put("a", 1).await;
        cache.put("b", 2).await;
        cache.put("a", 10).await;
        cache.put("c", 3).await;

        assert_eq!(cache.keys().await, vec!["a".to_string(), "c".to_string()]);
        assert_eq!(cache.get("a").await, Some(10));
    }

    #[tokio::test]
    async fn every_mutation_is_persisted_in_recency_order() {
        let (store, cache) = fresh(3);
        cache.put("a", 1).await;
        cache.put("b", 2).await;
        cache.get("a").await;

        let blob = store.snapshot().expect("persisted blob");
        let persisted: IndexMap<String, u32> = serde_json::from_slice(&blob).unwrap();
        assert_eq!(
            persisted.keys().cloned().collect::<Vec<_>>(),
            vec!["b".to_string(), "a".to_string()]
        );
    }

    #[tokio::test]
    async fn misses_do_not_write() {
        let (store, cache) = fresh(3);
        assert_eq!(cache.get("absent").await, None);
        assert!(store.snapshot().is_none());
        assert_eq!(cache.stats().snapshot().misses, 1);
    }

    #[tokio::test]
    async fn hydrates_from_store_and_keeps_order() {
        let store = Arc::new(MemoryStore::with_blob(r#"{"old":1,"mid":2,"new":3}"#));
        let cache = ResultCache::<u32>::hydrate(store, 2).await;

        assert_eq!(cache.keys().await, vec!["mid".to_string(), "new".to_string()]);
        assert_eq!(cache.stats().snapshot().entries, 2);
    }

    #[tokio::test]
    async fn malformed_store_yields_empty_cache() {
        let store = Arc::new(MemoryStore::with_blob("not json"));
        let cache = ResultCache::<u32>::hydrate(store, 5).await;
        assert!(cache.is_empty().await);
        assert_eq!(cache.stats().snapshot().corrupt_loads, 1);
    }

    #[tokio::test]
    async fn write_failures_are_swallowed() {
        let store = Arc::new(MemoryStore::read_only(None));
        let cache = ResultCache::empty(store, 5);
        cache.put("k", 7u32).await;

        assert_eq!(cache.get("k").await, Some(7));
        let snapshot = cache.stats().snapshot();
        assert_eq!(snapshot.write_failures, 2);
        assert_eq!(snapshot.persist_failures(), 2);
    }
}
