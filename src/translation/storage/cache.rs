//! 翻译缓存模块
//!
//! 以 `(url, 目标语言, 模式, 文本哈希)` 为键的 TTL 缓存。
//!
//! - 过期条目在读取时视为不存在并顺带删除；打开缓存时做一次全量清理。
//! - 记录中保存原文，读取时原文不一致按未命中处理，哈希碰撞不会返回错误译文。
//! - 后端通过 [`KeyValueStore`] 抽象，默认实现是基于 `lru` 的有界内存存储。

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use serde::{Deserialize, Serialize};

use crate::translation::config::{constants, TranslationConfig};
use crate::translation::error::{TranslationError, TranslationResult};
use crate::translation::pipeline::RenderMode;

// ============================================================================
// 核心类型
// ============================================================================

/// 持久化的缓存记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheRecord {
    pub url: String,
    pub text: String,
    pub translation: String,
    pub target_lang: String,
    #[serde(rename = "type")]
    pub mode: RenderMode,
    /// 写入时间（毫秒时间戳）
    pub timestamp: i64,
}

/// 按前缀清理的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClearOutcome {
    pub removed: usize,
}

impl ClearOutcome {
    /// 是否确实删除了条目（用于界面提示）
    pub fn removed_any(&self) -> bool {
        self.removed > 0
    }
}

/// 缓存统计信息
#[derive(Debug, Default, Clone)]
pub struct CacheStats {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub writes: u64,
    pub expired_removed: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// 计算缓存命中率
    pub fn hit_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.total_requests as f64
        }
    }
}

/// 时间来源
pub trait Clock: Send + Sync {
    /// 当前时间（毫秒时间戳）
    fn now_millis(&self) -> i64;
}

/// 系统时钟
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// 手动推进的时钟，测试中模拟时间流逝
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(start_millis),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// 缓存后端
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> TranslationResult<Option<CacheRecord>>;

    /// 写入记录，返回因容量限制被淘汰的键
    async fn set(&self, key: String, record: CacheRecord) -> TranslationResult<Option<String>>;

    /// 删除指定键，返回实际删除的数量
    async fn remove(&self, keys: &[String]) -> TranslationResult<usize>;

    async fn entries(&self) -> TranslationResult<Vec<(String, CacheRecord)>>;

    async fn len(&self) -> TranslationResult<usize>;
}

/// 基于 LRU 的有界内存存储
pub struct MemoryStore {
    entries: Mutex<LruCache<String, CacheRecord>>,
}

impl MemoryStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn lock(&self) -> TranslationResult<std::sync::MutexGuard<'_, LruCache<String, CacheRecord>>> {
        self.entries
            .lock()
            .map_err(|e| TranslationError::CacheError(format!("缓存锁已损坏: {}", e)))
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> TranslationResult<Option<CacheRecord>> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn set(&self, key: String, record: CacheRecord) -> TranslationResult<Option<String>> {
        let evicted = self.lock()?.push(key.clone(), record);
        Ok(evicted.and_then(|(old_key, _)| (old_key != key).then_some(old_key)))
    }

    async fn remove(&self, keys: &[String]) -> TranslationResult<usize> {
        let mut entries = self.lock()?;
        Ok(keys.iter().filter(|key| entries.pop(*key).is_some()).count())
    }

    async fn entries(&self) -> TranslationResult<Vec<(String, CacheRecord)>> {
        Ok(self
            .lock()?
            .iter()
            .map(|(key, record)| (key.clone(), record.clone()))
            .collect())
    }

    async fn len(&self) -> TranslationResult<usize> {
        Ok(self.lock()?.len())
    }
}

// ============================================================================
// 缓存存储
// ============================================================================

/// 翻译缓存
pub struct CacheStore {
    backend: Box<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    ttl_millis: i64,
    stats: RwLock<CacheStats>,
}

impl CacheStore {
    /// 打开缓存并清理过期条目
    pub async fn open(
        backend: Box<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> TranslationResult<Self> {
        let store = Self {
            backend,
            clock,
            ttl_millis: ttl.as_millis() as i64,
            stats: RwLock::new(CacheStats::default()),
        };

        let removed = store.sweep_expired().await?;
        if removed > 0 {
            tracing::info!("缓存初始化清理过期条目: {}", removed);
        }

        Ok(store)
    }

    /// 使用内存后端和系统时钟
    pub async fn in_memory(capacity: usize, ttl: Duration) -> TranslationResult<Self> {
        Self::open(Box::new(MemoryStore::new(capacity)), Arc::new(SystemClock), ttl).await
    }

    pub async fn from_config(config: &TranslationConfig) -> TranslationResult<Self> {
        Self::in_memory(config.cache_capacity, config.cache_ttl()).await
    }

    /// 生成缓存键：`{url}_{lang}_{mode}_{hash}`
    pub fn cache_key(url: &str, text: &str, target_lang: &str, mode: RenderMode) -> String {
        format!("{}{}", Self::key_prefix(url, target_lang, mode), hash_text(text))
    }

    /// 某页面、语言、模式下所有键的公共前缀
    pub fn key_prefix(url: &str, target_lang: &str, mode: RenderMode) -> String {
        format!("{}_{}_{}_", url, target_lang, mode.as_str())
    }

    fn is_expired(&self, record: &CacheRecord) -> bool {
        self.clock.now_millis() - record.timestamp > self.ttl_millis
    }

    fn record_stats(&self, update: impl FnOnce(&mut CacheStats)) {
        match self.stats.write() {
            Ok(mut stats) => update(&mut stats),
            Err(poisoned) => update(&mut poisoned.into_inner()),
        }
    }

    /// 查询缓存，过期或原文不一致时返回 `None`
    pub async fn get(
        &self,
        url: &str,
        text: &str,
        target_lang: &str,
        mode: RenderMode,
    ) -> TranslationResult<Option<CacheRecord>> {
        let key = Self::cache_key(url, text, target_lang, mode);

        let record = match self.backend.get(&key).await? {
            Some(record) => record,
            None => {
                self.record_stats(|s| {
                    s.total_requests += 1;
                    s.cache_misses += 1;
                });
                return Ok(None);
            }
        };

        if self.is_expired(&record) {
            self.backend.remove(std::slice::from_ref(&key)).await?;
            tracing::debug!("缓存已过期并删除: {}", key);
            self.record_stats(|s| {
                s.total_requests += 1;
                s.cache_misses += 1;
                s.expired_removed += 1;
            });
            return Ok(None);
        }

        if record.text != text {
            tracing::debug!("缓存键冲突，原文不一致: {}", key);
            self.record_stats(|s| {
                s.total_requests += 1;
                s.cache_misses += 1;
            });
            return Ok(None);
        }

        self.record_stats(|s| {
            s.total_requests += 1;
            s.cache_hits += 1;
        });
        Ok(Some(record))
    }

    /// 写入缓存（同键后写覆盖先写）
    pub async fn set(
        &self,
        url: &str,
        text: &str,
        translation: &str,
        target_lang: &str,
        mode: RenderMode,
    ) -> TranslationResult<()> {
        let key = Self::cache_key(url, text, target_lang, mode);
        let record = CacheRecord {
            url: url.to_string(),
            text: text.to_string(),
            translation: translation.to_string(),
            target_lang: target_lang.to_string(),
            mode,
            timestamp: self.clock.now_millis(),
        };

        let evicted = self.backend.set(key, record).await?;
        if let Some(evicted) = &evicted {
            tracing::debug!("缓存容量已满，淘汰: {}", evicted);
        }
        self.record_stats(|s| {
            s.writes += 1;
            if evicted.is_some() {
                s.evictions += 1;
            }
        });
        Ok(())
    }

    /// 页面在该语言与模式下是否存在未过期的缓存
    pub async fn has_any(&self, url: &str, target_lang: &str, mode: RenderMode) -> TranslationResult<bool> {
        let prefix = Self::key_prefix(url, target_lang, mode);
        Ok(self
            .backend
            .entries()
            .await?
            .iter()
            .any(|(key, record)| key.starts_with(&prefix) && !self.is_expired(record)))
    }

    /// 删除键以 `{url}_{lang}_{mode}_` 开头的全部条目
    pub async fn clear(&self, url: &str, target_lang: &str, mode: RenderMode) -> TranslationResult<ClearOutcome> {
        let prefix = Self::key_prefix(url, target_lang, mode);
        let keys: Vec<String> = self
            .backend
            .entries()
            .await?
            .into_iter()
            .map(|(key, _)| key)
            .filter(|key| key.starts_with(&prefix))
            .collect();

        let removed = self.backend.remove(&keys).await?;
        tracing::info!("已清除缓存 {} 条: {}", removed, prefix);
        Ok(ClearOutcome { removed })
    }

    /// 页面的全部有效缓存：原文 → 译文
    pub async fn page_cache(
        &self,
        url: &str,
        target_lang: &str,
        mode: RenderMode,
    ) -> TranslationResult<HashMap<String, String>> {
        let prefix = Self::key_prefix(url, target_lang, mode);
        Ok(self
            .backend
            .entries()
            .await?
            .into_iter()
            .filter(|(key, record)| key.starts_with(&prefix) && !self.is_expired(record))
            .map(|(_, record)| (record.text, record.translation))
            .collect())
    }

    /// 删除全部过期条目，返回删除数量
    pub async fn sweep_expired(&self) -> TranslationResult<usize> {
        let expired: Vec<String> = self
            .backend
            .entries()
            .await?
            .into_iter()
            .filter(|(_, record)| self.is_expired(record))
            .map(|(key, _)| key)
            .collect();

        if expired.is_empty() {
            return Ok(0);
        }

        let removed = self.backend.remove(&expired).await?;
        self.record_stats(|s| s.expired_removed += removed as u64);
        Ok(removed)
    }

    pub fn stats(&self) -> CacheStats {
        match self.stats.read() {
            Ok(stats) => stats.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub async fn len(&self) -> TranslationResult<usize> {
        self.backend.len().await
    }

    pub async fn is_empty(&self) -> TranslationResult<bool> {
        Ok(self.len().await? == 0)
    }
}

/// 文本哈希：blake3 十六进制摘要的前缀
pub fn hash_text(text: &str) -> String {
    let hash = blake3::hash(text.as_bytes());
    hash.to_hex().as_str()[..constants::CACHE_HASH_HEX_LEN].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://example.com/article";
    const HOUR: Duration = Duration::from_secs(3600);

    async fn store_with_clock(capacity: usize) -> (CacheStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let store = CacheStore::open(Box::new(MemoryStore::new(capacity)), clock.clone(), HOUR)
            .await
            .unwrap();
        (store, clock)
    }

    #[tokio::test]
    async fn test_cache_basic_operations() {
        let (cache, _) = store_with_clock(100).await;

        cache.set(URL, "Bonjour", "Hello", "en", RenderMode::Replace).await.unwrap();
        let record = cache.get(URL, "Bonjour", "en", RenderMode::Replace).await.unwrap().unwrap();
        assert_eq!(record.translation, "Hello");
        assert_eq!(record.mode, RenderMode::Replace);

        // 模式和语言都是键的一部分
        assert!(cache.get(URL, "Bonjour", "en", RenderMode::Compare).await.unwrap().is_none());
        assert!(cache.get(URL, "Bonjour", "de", RenderMode::Replace).await.unwrap().is_none());

        let stats = cache.stats();
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_misses, 2);
        assert_eq!(stats.writes, 1);
    }

    #[test]
    fn test_cache_key_format() {
        let key = CacheStore::cache_key(URL, "Bonjour", "en", RenderMode::Replace);
        assert_eq!(key, format!("{}_en_replace_{}", URL, hash_text("Bonjour")));
        assert_eq!(hash_text("Bonjour").len(), 16);
        assert_ne!(hash_text("Bonjour"), hash_text("Bonsoir"));
    }

    #[tokio::test]
    async fn test_cache_expiration() {
        let (cache, clock) = store_with_clock(100).await;
        cache.set(URL, "Bonjour", "Hello", "en", RenderMode::Replace).await.unwrap();

        clock.advance(HOUR);
        assert!(cache.get(URL, "Bonjour", "en", RenderMode::Replace).await.unwrap().is_some());

        clock.advance(Duration::from_millis(1));
        assert!(cache.get(URL, "Bonjour", "en", RenderMode::Replace).await.unwrap().is_none());
        // 过期条目在读取时被删除
        assert_eq!(cache.len().await.unwrap(), 0);
        assert_eq!(cache.stats().expired_removed, 1);
    }

    #[tokio::test]
    async fn test_open_sweeps_expired_entries() {
        let clock = Arc::new(ManualClock::new(0));
        let backend = MemoryStore::new(10);
        let stale = CacheRecord {
            url: URL.to_string(),
            text: "old".to_string(),
            translation: "alt".to_string(),
            target_lang: "en".to_string(),
            mode: RenderMode::Compare,
            timestamp: 0,
        };
        backend.set("stale".to_string(), stale.clone()).await.unwrap();
        backend
            .set("fresh".to_string(), CacheRecord { timestamp: 7_000_000, ..stale })
            .await
            .unwrap();

        clock.advance(Duration::from_millis(7_200_000));
        let cache = CacheStore::open(Box::new(backend), clock, HOUR).await.unwrap();
        assert_eq!(cache.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_clear_is_prefix_scoped() {
        let (cache, _) = store_with_clock(100).await;
        cache.set(URL, "one", "eins", "de", RenderMode::Replace).await.unwrap();
        cache.set(URL, "two", "zwei", "de", RenderMode::Replace).await.unwrap();
        cache.set(URL, "one", "eins", "de", RenderMode::Compare).await.unwrap();
        cache.set(URL, "one", "un", "fr", RenderMode::Replace).await.unwrap();
        cache.set("https://other.org", "one", "eins", "de", RenderMode::Replace).await.unwrap();

        let outcome = cache.clear(URL, "de", RenderMode::Replace).await.unwrap();
        assert_eq!(outcome.removed, 2);
        assert!(outcome.removed_any());
        assert_eq!(cache.len().await.unwrap(), 3);
        assert!(cache.get(URL, "one", "de", RenderMode::Compare).await.unwrap().is_some());

        let again = cache.clear(URL, "de", RenderMode::Replace).await.unwrap();
        assert!(!again.removed_any());
    }

    #[tokio::test]
    async fn test_has_any_honours_ttl() {
        let (cache, clock) = store_with_clock(100).await;
        assert!(!cache.has_any(URL, "en", RenderMode::Replace).await.unwrap());

        cache.set(URL, "Bonjour", "Hello", "en", RenderMode::Replace).await.unwrap();
        assert!(cache.has_any(URL, "en", RenderMode::Replace).await.unwrap());
        assert!(!cache.has_any(URL, "en", RenderMode::Compare).await.unwrap());

        clock.advance(HOUR * 2);
        assert!(!cache.has_any(URL, "en", RenderMode::Replace).await.unwrap());
    }

    #[tokio::test]
    async fn test_page_cache() {
        let (cache, _) = store_with_clock(100).await;
        cache.set(URL, "Bonjour", "Hello", "en", RenderMode::Compare).await.unwrap();
        cache.set(URL, "Merci", "Thanks", "en", RenderMode::Compare).await.unwrap();
        cache.set(URL, "Merci", "Danke", "de", RenderMode::Compare).await.unwrap();

        let page = cache.page_cache(URL, "en", RenderMode::Compare).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page.get("Merci").map(String::as_str), Some("Thanks"));
    }

    #[tokio::test]
    async fn test_text_mismatch_is_a_miss() {
        let clock = Arc::new(ManualClock::new(0));
        let backend = MemoryStore::new(10);
        let key = CacheStore::cache_key(URL, "Bonjour", "en", RenderMode::Replace);
        backend
            .set(
                key,
                CacheRecord {
                    url: URL.to_string(),
                    text: "Something else".to_string(),
                    translation: "Wrong".to_string(),
                    target_lang: "en".to_string(),
                    mode: RenderMode::Replace,
                    timestamp: 0,
                },
            )
            .await
            .unwrap();

        let cache = CacheStore::open(Box::new(backend), clock, HOUR).await.unwrap();
        assert!(cache.get(URL, "Bonjour", "en", RenderMode::Replace).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let (cache, _) = store_with_clock(2).await;
        cache.set(URL, "1", "一", "zh", RenderMode::Replace).await.unwrap();
        cache.set(URL, "2", "二", "zh", RenderMode::Replace).await.unwrap();

        // 访问第一个，使其成为最近使用的
        cache.get(URL, "1", "zh", RenderMode::Replace).await.unwrap();
        cache.set(URL, "3", "三", "zh", RenderMode::Replace).await.unwrap();

        assert_eq!(cache.len().await.unwrap(), 2);
        assert!(cache.get(URL, "1", "zh", RenderMode::Replace).await.unwrap().is_some());
        assert!(cache.get(URL, "2", "zh", RenderMode::Replace).await.unwrap().is_none());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_record_serialization() {
        let record = CacheRecord {
            url: URL.to_string(),
            text: "Bonjour".to_string(),
            translation: "Hello".to_string(),
            target_lang: "en".to_string(),
            mode: RenderMode::Compare,
            timestamp: 42,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["targetLang"], "en");
        assert_eq!(json["type"], "compare");
    }
}
