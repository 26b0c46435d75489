//! In-memory caching for aggregated search results.
//!
//! [`CacheManager`] is a bounded LRU cache with per-entry TTL used for whole
//! query responses. [`SourceCache`] keeps one such cache per source with a
//! TTL matched to how often that source's data changes.

mod key;
mod source;

pub use key::{cache_key, source_cache_key};
pub use source::{default_source_ttl, SourceCache};

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

/// Default time-to-live for cached entries.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Default maximum number of cached entries.
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

/// A cached value with its expiry bookkeeping.
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    expires_at: Instant,
    hits: u64,
    /// Recency stamp; higher is more recently used.
    stamp: u64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug)]
struct CacheState<V> {
    entries: HashMap<String, CacheEntry<V>>,
    /// Recency stamp -> key, oldest first.
    recency: BTreeMap<u64, String>,
    next_stamp: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<V> CacheState<V> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            next_stamp: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    fn stamp(&mut self) -> u64 {
        self.next_stamp += 1;
        self.next_stamp
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.stamp);
        Some(entry)
    }

    fn evict_oldest(&mut self) -> Option<String> {
        let (_, key) = self.recency.pop_first()?;
        self.entries.remove(&key);
        self.evictions += 1;
        Some(key)
    }
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub max_entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Hit rate in percent, rounded to two decimals.
    pub hit_rate: f64,
}

/// Age and remaining lifetime of a single entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryInfo {
    pub age: Duration,
    pub ttl_remaining: Duration,
    pub hits: u64,
    pub expired: bool,
}

/// Bounded LRU cache with per-entry TTL.
///
/// All state sits behind one mutex that is never held across an await.
#[derive(Debug)]
pub struct CacheManager<V> {
    state: Mutex<CacheState<V>>,
    default_ttl: Duration,
    max_entries: usize,
}

impl<V: Clone> CacheManager<V> {
    /// Create a cache with the default TTL and capacity.
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_TTL, DEFAULT_MAX_ENTRIES)
    }

    /// Create a cache with a custom TTL and capacity.
    pub fn with_limits(default_ttl: Duration, max_entries: usize) -> Self {
        Self {
            state: Mutex::new(CacheState::new()),
            default_ttl,
            max_entries: max_entries.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Get a value. Expired entries are removed and count as a miss;
    /// hits move the entry to the most-recently-used position.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut state = self.lock();

        let expired = match state.entries.get(key) {
            None => {
                state.misses += 1;
                return None;
            }
            Some(entry) => entry.is_expired(now),
        };

        if expired {
            state.remove(key);
            state.misses += 1;
            debug!("Cache entry expired: {}", key);
            return None;
        }

        let stamp = state.stamp();
        let entry = state.entries.get_mut(key)?;
        let old_stamp = entry.stamp;
        entry.stamp = stamp;
        entry.hits += 1;
        let value = entry.value.clone();

        state.recency.remove(&old_stamp);
        state.recency.insert(stamp, key.to_string());
        state.hits += 1;
        Some(value)
    }

    /// Whether a live entry exists, without touching hit counters or recency.
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.lock()
            .entries
            .get(key)
            .is_some_and(|e| !e.is_expired(now))
    }

    /// Store a value. When the cache is full the least-recently-used entry
    /// is evicted first; replacing an existing key never evicts.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let key = key.into();
        let now = Instant::now();
        let ttl = ttl.unwrap_or(self.default_ttl);
        let mut state = self.lock();

        if state.remove(&key).is_none() {
            while state.entries.len() >= self.max_entries {
                match state.evict_oldest() {
                    Some(evicted) => debug!("Cache evicted: {}", evicted),
                    None => break,
                }
            }
        }

        let stamp = state.stamp();
        state.recency.insert(stamp, key.clone());
        state.entries.insert(
            key,
            CacheEntry {
                value,
                created_at: now,
                expires_at: now + ttl,
                hits: 0,
                stamp,
            },
        );
    }

    /// Remove an entry. Returns true if it existed.
    pub fn delete(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    /// Drop every entry, returning how many were removed.
    pub fn invalidate_all(&self) -> usize {
        let mut state = self.lock();
        let count = state.entries.len();
        state.entries.clear();
        state.recency.clear();
        count
    }

    /// Drop expired entries, returning how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.lock();
        let expired: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            state.remove(key);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        let total = state.hits + state.misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            ((state.hits as f64 / total as f64) * 100.0 * 100.0).round() / 100.0
        };
        CacheStats {
            entries: state.entries.len(),
            max_entries: self.max_entries,
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
            hit_rate,
        }
    }

    /// Inspect an entry without counting a hit.
    pub fn entry_info(&self, key: &str) -> Option<EntryInfo> {
        let now = Instant::now();
        let state = self.lock();
        let entry = state.entries.get(key)?;
        Some(EntryInfo {
            age: now.saturating_duration_since(entry.created_at),
            ttl_remaining: entry.expires_at.saturating_duration_since(now),
            hits: entry.hits,
            expired: entry.is_expired(now),
        })
    }
}

impl<V: Clone> Default for CacheManager<V> {
    fn default() -> Self {
        Self::new()
    }
}
