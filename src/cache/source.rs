//! Per-source caches with volatility-based TTLs.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::{CacheManager, CacheStats};
use crate::models::SourceType;

/// Entries kept per source.
const SOURCE_MAX_ENTRIES: usize = 200;

/// How long data from each kind of source stays fresh.
pub fn default_source_ttl(source_type: SourceType) -> Duration {
    match source_type {
        SourceType::Api => Duration::from_secs(2 * 3600),
        SourceType::Scraper => Duration::from_secs(6 * 3600),
        SourceType::Partner => Duration::from_secs(3600),
        SourceType::Demo => Duration::from_secs(24 * 3600),
        SourceType::Cache => Duration::from_secs(3600),
    }
}

/// One [`CacheManager`] per source name.
#[derive(Debug)]
pub struct SourceCache<V> {
    caches: Mutex<HashMap<String, Arc<CacheManager<V>>>>,
    /// TTL overrides by source name.
    ttl_overrides: HashMap<String, Duration>,
}

impl<V: Clone> SourceCache<V> {
    pub fn new() -> Self {
        Self::with_overrides(HashMap::new())
    }

    /// Create a source cache with per-source TTL overrides.
    pub fn with_overrides(ttl_overrides: HashMap<String, Duration>) -> Self {
        Self {
            caches: Mutex::new(HashMap::new()),
            ttl_overrides,
        }
    }

    /// TTL applied to entries from a source.
    pub fn ttl_for(&self, source: &str, source_type: SourceType) -> Duration {
        self.ttl_overrides
            .get(source)
            .copied()
            .unwrap_or_else(|| default_source_ttl(source_type))
    }

    fn cache(&self, source: &str) -> Option<Arc<CacheManager<V>>> {
        self.caches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(source)
            .cloned()
    }

    fn cache_or_create(&self, source: &str, source_type: SourceType) -> Arc<CacheManager<V>> {
        let ttl = self.ttl_for(source, source_type);
        self.caches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(source.to_string())
            .or_insert_with(|| Arc::new(CacheManager::with_limits(ttl, SOURCE_MAX_ENTRIES)))
            .clone()
    }

    pub fn get(&self, source: &str, key: &str) -> Option<V> {
        self.cache(source)?.get(key)
    }

    pub fn set(&self, source: &str, source_type: SourceType, key: impl Into<String>, value: V) {
        self.cache_or_create(source, source_type).set(key, value, None);
    }

    /// Drop everything cached for one source.
    pub fn invalidate_source(&self, source: &str) -> usize {
        self.cache(source).map(|c| c.invalidate_all()).unwrap_or(0)
    }

    pub fn invalidate_all(&self) -> usize {
        self.all().iter().map(|c| c.invalidate_all()).sum()
    }

    pub fn cleanup_expired(&self) -> usize {
        self.all().iter().map(|c| c.cleanup_expired()).sum()
    }

    pub fn stats(&self) -> BTreeMap<String, CacheStats> {
        self.caches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, cache)| (name.clone(), cache.stats()))
            .collect()
    }

    fn all(&self) -> Vec<Arc<CacheManager<V>>> {
        self.caches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

impl<V: Clone> Default for SourceCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ttls() {
        assert_eq!(default_source_ttl(SourceType::Api), Duration::from_secs(7200));
        assert_eq!(default_source_ttl(SourceType::Scraper), Duration::from_secs(21600));
        assert_eq!(default_source_ttl(SourceType::Partner), Duration::from_secs(3600));
        assert_eq!(default_source_ttl(SourceType::Demo), Duration::from_secs(86400));
    }

    #[test]
    fn test_override_wins() {
        let cache: SourceCache<u32> = SourceCache::with_overrides(HashMap::from([(
            "amadeus".to_string(),
            Duration::from_secs(60),
        )]));
        assert_eq!(cache.ttl_for("amadeus", SourceType::Api), Duration::from_secs(60));
        assert_eq!(cache.ttl_for("xotelo", SourceType::Api), Duration::from_secs(7200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_partner_entries_expire_before_scraper_entries() {
        let cache = SourceCache::new();
        cache.set("partner", SourceType::Partner, "k", 1);
        cache.set("traveloka", SourceType::Scraper, "k", 2);

        tokio::time::advance(Duration::from_secs(2 * 3600)).await;

        assert_eq!(cache.get("partner", "k"), None);
        assert_eq!(cache.get("traveloka", "k"), Some(2));
    }

    #[test]
    fn test_invalidate_source_is_scoped() {
        let cache = SourceCache::new();
        cache.set("xotelo", SourceType::Api, "a", 1);
        cache.set("xotelo", SourceType::Api, "b", 2);
        cache.set("demo", SourceType::Demo, "a", 3);

        assert_eq!(cache.invalidate_source("xotelo"), 2);
        assert_eq!(cache.invalidate_source("unknown"), 0);
        assert_eq!(cache.get("demo", "a"), Some(3));
        assert_eq!(cache.stats().len(), 2);
    }
}
