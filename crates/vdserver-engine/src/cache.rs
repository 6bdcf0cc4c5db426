//! Shared parse cache.
//!
//! ## Cache Strategy
//!
//! - **Key**: normalized file path
//! - **Value**: `Arc<ParsedModule>`, handed out without copying
//! - **Eviction**: least recently used once `capacity` is reached
//! - **Ordering**: an entry is never replaced by a module with an older
//!   stamp, so background indexing cannot clobber a newer editor buffer

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::debug;
use vdserver_parser::ParsedModule;

/// Default number of cached modules.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Process-wide cache of parsed modules with bounded capacity.
#[derive(Debug)]
pub struct ParseCache {
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    entries: LruCache<String, Arc<ParsedModule>>,
    stats: CacheStats,
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Current number of entries.
    pub size: usize,
    /// Maximum capacity.
    pub capacity: usize,
    /// Lookups that found an entry.
    pub hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// Entries dropped to make room.
    pub evictions: u64,
}

impl ParseCache {
    /// Create a cache holding at most `capacity` modules (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                stats: CacheStats {
                    capacity: capacity.get(),
                    ..CacheStats::default()
                },
            }),
        }
    }

    /// Look up a module by normalized path.
    pub fn get(&self, path: &str) -> Option<Arc<ParsedModule>> {
        let mut inner = self.inner.lock();
        let found = inner.entries.get(path).cloned();
        if found.is_some() {
            inner.stats.hits += 1;
        } else {
            inner.stats.misses += 1;
        }
        found
    }

    /// Add or replace a module.
    ///
    /// Returns false, leaving the cache untouched, when the cached entry for
    /// the same path carries a newer stamp.
    pub fn insert(&self, module: Arc<ParsedModule>) -> bool {
        let mut inner = self.inner.lock();
        let replacing = match inner.entries.peek(&module.path) {
            Some(existing) if existing.stamp > module.stamp => {
                debug!(path = %module.path, "kept newer module in shared cache");
                return false;
            }
            Some(_) => true,
            None => false,
        };

        if let Some((evicted, _)) = inner.entries.push(module.path.clone(), module) {
            if !replacing {
                inner.stats.evictions += 1;
                debug!(path = %evicted, "evicted from shared cache");
            }
        }
        inner.stats.size = inner.entries.len();
        true
    }

    /// Remove a module.
    pub fn remove(&self, path: &str) -> Option<Arc<ParsedModule>> {
        let mut inner = self.inner.lock();
        let removed = inner.entries.pop(path);
        inner.stats.size = inner.entries.len();
        removed
    }

    /// All cached modules, without affecting recency.
    pub fn modules(&self) -> Vec<Arc<ParsedModule>> {
        let inner = self.inner.lock();
        inner.entries.iter().map(|(_, module)| Arc::clone(module)).collect()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.stats.size = 0;
    }

    /// Current statistics.
    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.inner.lock().entries.cap().get()
    }

    /// Current number of entries.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Returns true if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ParseCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(path: &str, stamp: u64) -> Arc<ParsedModule> {
        Arc::new(ParsedModule::parse(path, "int x;", &[]).with_stamp(stamp))
    }

    #[test]
    fn test_insert_and_get() {
        let cache = ParseCache::new(10);
        assert!(cache.get("a.d").is_none());

        assert!(cache.insert(module("a.d", 1)));
        assert_eq!(cache.get("a.d").unwrap().stamp, 1);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
    }

    #[test]
    fn test_older_stamp_does_not_replace_newer() {
        let cache = ParseCache::new(10);
        cache.insert(module("a.d", 5));
        assert!(!cache.insert(module("a.d", 3)));
        assert_eq!(cache.get("a.d").unwrap().stamp, 5);

        assert!(cache.insert(module("a.d", 5)));
        assert!(cache.insert(module("a.d", 6)));
        assert_eq!(cache.get("a.d").unwrap().stamp, 6);
    }

    #[test]
    fn test_eviction_of_least_recently_used() {
        let cache = ParseCache::new(2);
        cache.insert(module("a.d", 1));
        cache.insert(module("b.d", 2));
        cache.get("a.d");
        cache.insert(module("c.d", 3));

        assert!(cache.get("a.d").is_some());
        assert!(cache.get("b.d").is_none());
        assert_eq!(cache.stats().evictions, 1);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_replacing_is_not_an_eviction() {
        let cache = ParseCache::new(1);
        cache.insert(module("a.d", 1));
        cache.insert(module("a.d", 2));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_remove_and_clear() {
        let cache = ParseCache::new(4);
        cache.insert(module("a.d", 1));
        cache.insert(module("b.d", 1));
        assert!(cache.remove("a.d").is_some());
        assert_eq!(cache.modules().len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let cache = ParseCache::new(0);
        assert_eq!(cache.capacity(), 1);
    }
}
