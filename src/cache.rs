//! Bounded in-memory cache with per-entry TTL.
//!
//! An explicit component constructed once per process and passed by
//! reference, instead of a hidden module-level static. Capacity is enforced
//! by LRU eviction; staleness by a fixed TTL checked on read.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;

/// LRU cache whose entries expire `ttl` after insertion.
pub struct TtlCache<K: Hash + Eq, V: Clone> {
    inner: Mutex<LruCache<K, (Instant, V)>>,
    ttl: Duration,
}

impl<K: Hash + Eq, V: Clone> TtlCache<K, V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity clamped to >= 1");
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Returns the cached value, dropping it if it has expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut guard = self.inner.lock().expect("cache mutex poisoned");
        match guard.get(key) {
            Some((inserted_at, value)) if inserted_at.elapsed() < self.ttl => Some(value.clone()),
            Some(_) => {
                guard.pop(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: K, value: V) {
        let mut guard = self.inner.lock().expect("cache mutex poisoned");
        guard.put(key, (Instant::now(), value));
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
