use std::sync::atomic::{AtomicUsize, Ordering::Relaxed};

use serde::Serialize;

/// Something a cache observed about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEvent {
    Hit,
    /// Key never stored, or already evicted.
    Miss,
    /// Key present but older than its time to live; counts as a miss too.
    Expired,
    Evicted(usize),
    /// The durable store could not be read at hydration.
    ReadFailed,
    /// The durable store held data that did not decode.
    Corrupt,
    /// The in-memory map could not be encoded for the store.
    EncodeFailed,
    /// The durable store rejected a write.
    WriteFailed,
}

/// Counters shared by the result cache and the response cache. Storage
/// failures are split by kind so a full disk can be told apart from a
/// corrupted blob.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicUsize,
    misses: AtomicUsize,
    expired: AtomicUsize,
    entries: AtomicUsize,
    evictions: AtomicUsize,
    read_failures: AtomicUsize,
    corrupt_loads: AtomicUsize,
    encode_failures: AtomicUsize,
    write_failures: AtomicUsize,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: CacheEvent) {
        match event {
            CacheEvent::Hit => self.hits.fetch_add(1, Relaxed),
            CacheEvent::Miss => self.misses.fetch_add(1, Relaxed),
            CacheEvent::Expired => {
                self.misses.fetch_add(1, Relaxed);
                self.expired.fetch_add(1, Relaxed)
            }
            CacheEvent::Evicted(count) => self.evictions.fetch_add(count, Relaxed),
            CacheEvent::ReadFailed => self.read_failures.fetch_add(1, Relaxed),
            CacheEvent::Corrupt => self.corrupt_loads.fetch_add(1, Relaxed),
            CacheEvent::EncodeFailed => self.encode_failures.fetch_add(1, Relaxed),
            CacheEvent::WriteFailed => self.write_failures.fetch_add(1, Relaxed),
        };
    }

    pub fn set_entries(&self, count: usize) {
        self.entries.store(count, Relaxed);
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Relaxed),
            misses: self.misses.load(Relaxed),
            expired: self.expired.load(Relaxed),
            entries: self.entries.load(Relaxed),
            evictions: self.evictions.load(Relaxed),
            read_failures: self.read_failures.load(Relaxed),
            corrupt_loads: self.corrupt_loads.load(Relaxed),
            encode_failures: self.encode_failures.load(Relaxed),
            write_failures: self.write_failures.load(Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStatsSnapshot {
    pub hits: usize,
    pub misses: usize,
    pub expired: usize,
    pub entries: usize,
    pub evictions: usize,
    pub read_failures: usize,
    pub corrupt_loads: usize,
    pub encode_failures: usize,
    pub write_failures: usize,
}

impl CacheStatsSnapshot {
    /// Percentage of lookups served from memory; zero before any lookup.
    pub fn hit_rate(&self) -> f64 {
        match self.hits + self.misses {
            0 => 0.0,
            total => self.hits as f64 * 100.0 / total as f64,
        }
    }

    /// Storage problems of any kind that were logged and swallowed.
    pub fn persist_failures(&self) -> usize {
        self.read_failures + self.corrupt_loads + self.encode_failures + self.write_failures
    }
}
