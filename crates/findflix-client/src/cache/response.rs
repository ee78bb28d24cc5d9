use dashmap::DashMap;
use time::{Duration, OffsetDateTime};

use super::stats::{CacheEvent, CacheStats};

const DEFAULT_MAX_ENTRIES: usize = 256;

#[derive(Debug, Clone)]
struct Slot<T> {
    value: T,
    stored_at: OffsetDateTime,
}

/// Short-lived memory cache for raw HTTP bodies keyed by request URL.
#[derive(Debug)]
pub struct ResponseCache<T> {
    entries: DashMap<String, Slot<T>>,
    ttl: Duration,
    max_entries: usize,
    stats: CacheStats,
}

impl<T: Clone> ResponseCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self::with_max_entries(ttl, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_max_entries(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_entries: max_entries.max(1),
            stats: CacheStats::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<T> {
        let now = OffsetDateTime::now_utc();
        let lookup = self
            .entries
            .get(key)
            .map(|slot| (now - slot.stored_at <= self.ttl).then(|| slot.value.clone()));

        match lookup {
            Some(Some(value)) => {
                self.stats.record(CacheEvent::Hit);
                Some(value)
            }
            Some(None) => {
                // Expired entries are dropped on sight.
                self.entries.remove(key);
                self.stats.set_entries(self.entries.len());
                self.stats.record(CacheEvent::Expired);
                None
            }
            None => {
                self.stats.record(CacheEvent::Miss);
                None
            }
        }
    }

    pub fn insert(&self, key: impl Into<String>, value: T) {
        self.entries.insert(
            key.into(),
            Slot {
                value,
                stored_at: OffsetDateTime::now_utc(),
            },
        );
        self.evict_oldest();
        self.stats.set_entries(self.entries.len());
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.stats.set_entries(0);
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    fn evict_oldest(&self) {
        let overflow = self.entries.len().saturating_sub(self.max_entries);
        if overflow == 0 {
            return;
        }
        let mut ages: Vec<(OffsetDateTime, String)> = self
            .entries
            .iter()
            .map(|slot| (slot.stored_at, slot.key().clone()))
            .collect();
        ages.sort();
        for (_, key) in ages.into_iter().take(overflow) {
            self.entries.remove(&key);
        }
        self.stats.record(CacheEvent::Evicted(overflow));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serves_fresh_entries() {
        let cache = ResponseCache::new(Duration::hours(1));
        cache.insert("https://api/shows/1", b"{}".to_vec());
        assert_eq!(cache.get("https://api/shows/1"), Some(b"{}".to_vec()));
        assert_eq!(cache.stats().snapshot().hits, 1);
    }

    #[test]
    fn expired_entries_count_as_misses() {
        let cache = ResponseCache::new(Duration::milliseconds(50));
        cache.insert("key", 1);
        std::thread::sleep(std::time::Duration::from_millis(80));

        assert_eq!(cache.get("key"), None);
        let snapshot = cache.stats().snapshot();
        assert_eq!(snapshot.misses, 1);
        assert_eq!(snapshot.expired, 1);
        assert_eq!(snapshot.entries, 0);
    }

    #[test]
    fn bounded_by_max_entries() {
        let cache = ResponseCache::with_max_entries(Duration::hours(1), 2);
        cache.insert("a", 1);
        std::thread::sleep(std::time::Duration::from_millis(2));
        cache.insert("b", 2);
        std::thread::sleep(std::time::Duration::from_millis(2));
        cache.insert("c", 3);

        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("c"), Some(3));
        assert_eq!(cache.stats().snapshot().evictions, 1);
    }
}
