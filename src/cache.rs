//! Document cache
//!
//! Bounded LRU cache of decoded instances keyed by `_id`. Every operation,
//! lookups included, goes through one mutex: a hit reorders the recency
//! list, so there is no read-only path.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

/// A cached instance with its access bookkeeping
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub instance: Arc<Value>,
    pub last_access: Instant,
    pub access_count: u64,
}

/// Cumulative cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
    pub capacity: usize,
}

struct Inner {
    entries: LruCache<String, CacheEntry>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Strict-LRU cache of decoded documents
pub struct DocumentCache {
    inner: Mutex<Inner>,
}

impl DocumentCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    /// Insert or replace `id`, making it the most recently used entry.
    ///
    /// Returns the id evicted to make room, if any.
    pub fn put(&self, id: &str, instance: Arc<Value>) -> Option<String> {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        if let Some(entry) = inner.entries.get_mut(id) {
            entry.instance = instance;
            entry.last_access = now;
            return None;
        }

        let evicted = inner.entries.push(
            id.to_string(),
            CacheEntry {
                instance,
                last_access: now,
                access_count: 0,
            },
        );

        match evicted {
            Some((evicted_id, _)) if evicted_id != id => {
                inner.evictions += 1;
                tracing::trace!("Evicted {} from document cache", evicted_id);
                Some(evicted_id)
            }
            _ => None,
        }
    }

    /// Look up `id`; a hit becomes the most recently used entry
    pub fn get(&self, id: &str) -> Option<Arc<Value>> {
        let mut inner = self.inner.lock();

        let found = inner.entries.get_mut(id).map(|entry| {
            entry.last_access = Instant::now();
            entry.access_count += 1;
            Arc::clone(&entry.instance)
        });

        if found.is_some() {
            inner.hits += 1;
        } else {
            inner.misses += 1;
        }
        found
    }

    /// Copy of the entry without touching recency or counters
    pub fn peek(&self, id: &str) -> Option<CacheEntry> {
        self.inner.lock().entries.peek(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.lock().entries.contains(id)
    }

    pub fn remove(&self, id: &str) -> Option<Arc<Value>> {
        self.inner.lock().entries.pop(id).map(|entry| entry.instance)
    }

    /// Drop every entry (counters are kept)
    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            size: inner.entries.len(),
            capacity: inner.entries.cap().get(),
        }
    }
}
