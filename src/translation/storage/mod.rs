//! 存储层：翻译结果缓存

pub mod cache;

pub use cache::{
    hash_text, CacheRecord, CacheStats, CacheStore, ClearOutcome, Clock, KeyValueStore,
    ManualClock, MemoryStore, SystemClock,
};
