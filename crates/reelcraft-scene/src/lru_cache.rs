//! Bounded LRU cache with an eviction hook.
//!
//! Recency is tracked by `lru::LruCache`, whose linked hash map keeps the
//! access order and the key index in one structure. Capacity is enforced
//! here rather than by the inner map so every removal goes through the
//! eviction callback.

use serde::Serialize;
use std::time::Instant;
use tracing::trace;

/// A cached value with bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub value: T,
    pub inserted_at: Instant,
    pub size_bytes: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// `hits / (hits + misses) * 100`, 0 with no lookups.
    pub hit_rate: f64,
    pub total_size_bytes: usize,
}

/// Called with the key and value of every entry leaving the cache.
pub type EvictionCallback<T> = Box<dyn FnMut(&str, T) + Send>;

pub struct LruCache<T> {
    entries: lru::LruCache<String, CacheEntry<T>>,
    capacity: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
    total_size_bytes: usize,
    on_evict: Option<EvictionCallback<T>>,
}

impl<T> LruCache<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: lru::LruCache::unbounded(),
            capacity,
            hits: 0,
            misses: 0,
            evictions: 0,
            total_size_bytes: 0,
            on_evict: None,
        }
    }

    pub fn with_eviction_callback(mut self, callback: impl FnMut(&str, T) + Send + 'static) -> Self {
        self.on_evict = Some(Box::new(callback));
        self
    }

    pub fn set_eviction_callback(&mut self, callback: impl FnMut(&str, T) + Send + 'static) {
        self.on_evict = Some(Box::new(callback));
    }

    /// Look up `key`, marking it most recently used on a hit.
    pub fn get(&mut self, key: &str) -> Option<&T> {
        match self.entries.get(key) {
            Some(entry) => {
                self.hits += 1;
                Some(&entry.value)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Look up without touching recency or counters.
    pub fn peek(&self, key: &str) -> Option<&T> {
        self.entries.peek(key).map(|entry| &entry.value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains(key)
    }

    /// Insert or update `key`.
    ///
    /// Updating an existing key never evicts. Inserting a new key into a
    /// full cache evicts the least recently used entry first; with capacity
    /// 0 the new entry itself is evicted immediately.
    pub fn put(&mut self, key: impl Into<String>, value: T, size_bytes: Option<usize>) {
        let key = key.into();
        let entry = CacheEntry {
            value,
            inserted_at: Instant::now(),
            size_bytes,
        };

        if self.entries.contains(key.as_str()) {
            if let Some(old) = self.entries.put(key, entry) {
                self.total_size_bytes = self
                    .total_size_bytes
                    .saturating_sub(old.size_bytes.unwrap_or(0));
            }
            self.total_size_bytes += size_bytes.unwrap_or(0);
            return;
        }

        if self.capacity == 0 {
            self.evictions += 1;
            self.notify(&key, entry.value);
            return;
        }

        if self.entries.len() >= self.capacity {
            self.evict_lru();
        }
        self.total_size_bytes += size_bytes.unwrap_or(0);
        self.entries.put(key, entry);
    }

    /// Remove `key`, running the eviction callback. Returns whether it existed.
    pub fn remove(&mut self, key: &str) -> bool {
        match self.entries.pop(key) {
            Some(entry) => {
                self.release(key, entry);
                true
            }
            None => false,
        }
    }

    /// Evict the least recently used entry, returning its key.
    pub fn evict_lru(&mut self) -> Option<String> {
        let (key, entry) = self.entries.pop_lru()?;
        self.evictions += 1;
        trace!(key = %key, "lru eviction");
        self.release(&key, entry);
        Some(key)
    }

    /// Change the capacity, evicting LRU entries until the cache fits.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        while self.entries.len() > capacity {
            if self.evict_lru().is_none() {
                break;
            }
        }
    }

    /// Remove everything, running the eviction callback for each entry.
    pub fn clear(&mut self) {
        while let Some((key, entry)) = self.entries.pop_lru() {
            self.release(&key, entry);
        }
        self.total_size_bytes = 0;
    }

    pub fn stats(&self) -> CacheStats {
        let lookups = self.hits + self.misses;
        let hit_rate = if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64 * 100.0
        };
        CacheStats {
            size: self.entries.len(),
            capacity: self.capacity,
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            hit_rate,
            total_size_bytes: self.total_size_bytes,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Keys from most to least recently used.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    fn release(&mut self, key: &str, entry: CacheEntry<T>) {
        self.total_size_bytes = self
            .total_size_bytes
            .saturating_sub(entry.size_bytes.unwrap_or(0));
        self.notify(key, entry.value);
    }

    fn notify(&mut self, key: &str, value: T) {
        if let Some(callback) = self.on_evict.as_mut() {
            callback(key, value);
        }
    }
}

impl<T> std::fmt::Debug for LruCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LruCache")
            .field("len", &self.entries.len())
            .field("capacity", &self.capacity)
            .field("hits", &self.hits)
            .field("misses", &self.misses)
            .field("evictions", &self.evictions)
            .finish()
    }
}
