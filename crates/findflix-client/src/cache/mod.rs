pub mod lru;
pub mod response;
pub mod stats;
pub mod store;

pub use lru::{ResultCache, DEFAULT_CAPACITY};
pub use response::ResponseCache;
pub use stats::{CacheEvent, CacheStats, CacheStatsSnapshot};
pub use store::{FileStore, KeyValueStore, MemoryStore, StoreError};
