//! Search result cache / 搜索结果缓存
//!
//! Keyed by (query, include_cold, max) with a TTL and a generation
//! counter. The shard's fire-and-forget invalidate channel bumps the
//! generation, which makes every older entry invisible without walking
//! the map. / 按查询键缓存，失效信号只递增代号，不遍历清理。

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use yaosearch_backend::shard::types::Hit;

/// Entries beyond this trigger a coarse prune / 超过该数量触发粗粒度清理
const MAX_ENTRIES: usize = 1024;

struct CacheEntry {
    generation: u64,
    created_at: DateTime<Utc>,
    hits: Vec<Hit>,
}

pub struct ResultCache {
    enabled: bool,
    ttl: Duration,
    generation: AtomicU64,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl ResultCache {
    pub fn new(enabled: bool, ttl_secs: u64) -> Self {
        Self {
            enabled,
            ttl: Duration::seconds(ttl_secs as i64),
            generation: AtomicU64::new(0),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn key(query: &str, include_cold: bool, max: usize) -> String {
        format!("{}|{}|{}", query, include_cold, max)
    }

    pub fn get(&self, key: &str) -> Option<Vec<Hit>> {
        if !self.enabled {
            return None;
        }
        let generation = self.generation.load(Ordering::SeqCst);
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        if entry.generation != generation {
            return None;
        }
        if Utc::now().signed_duration_since(entry.created_at) > self.ttl {
            return None;
        }
        Some(entry.hits.clone())
    }

    pub fn put(&self, key: String, hits: Vec<Hit>) {
        if !self.enabled {
            return;
        }
        let generation = self.generation.load(Ordering::SeqCst);
        let now = Utc::now();
        let mut entries = self.entries.write();

        if entries.len() >= MAX_ENTRIES {
            // 先清过期和旧代条目，仍然太满就整体清空
            let ttl = self.ttl;
            entries.retain(|_, e| {
                e.generation == generation && now.signed_duration_since(e.created_at) <= ttl
            });
            if entries.len() >= MAX_ENTRIES {
                entries.clear();
            }
        }

        entries.insert(key, CacheEntry { generation, created_at: now, hits });
    }

    /// Fire-and-forget invalidation / 即发即忘的失效信号
    pub fn invalidate_all(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yaosearch_backend::shard::types::DocId;

    fn hit(id: &str) -> Hit {
        Hit { id: DocId::Str(id.to_string()), content: "payload".to_string(), rank: -1.0 }
    }

    #[test]
    fn test_put_get_roundtrip() {
        let cache = ResultCache::new(true, 60);
        let key = ResultCache::key("rust", false, 10);
        cache.put(key.clone(), vec![hit("a")]);

        let hits = cache.get(&key).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, DocId::Str("a".to_string()));
    }

    #[test]
    fn test_invalidate_hides_old_entries() {
        let cache = ResultCache::new(true, 60);
        let key = ResultCache::key("rust", false, 10);
        cache.put(key.clone(), vec![hit("a")]);

        cache.invalidate_all();
        assert!(cache.get(&key).is_none());

        // 失效后写入的新条目正常命中
        cache.put(key.clone(), vec![hit("b")]);
        assert!(cache.get(&key).is_some());
    }

    #[test]
    fn test_expired_entries_miss() {
        let cache = ResultCache::new(true, 0);
        let key = ResultCache::key("rust", false, 10);
        cache.put(key.clone(), vec![hit("a")]);
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn test_disabled_cache_never_hits() {
        let cache = ResultCache::new(false, 60);
        let key = ResultCache::key("rust", false, 10);
        cache.put(key.clone(), vec![hit("a")]);
        assert!(cache.get(&key).is_none());
        assert!(cache.is_empty());
    }
}
