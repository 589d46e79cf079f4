//! Memory Cache Module
//!
//! In-process region combining HashMap storage with LRU tracking and
//! per-element expiration. This is the local storage engine the access
//! facades and the remote cache peer sit on.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use regex::Regex;
use tracing::debug;

use crate::cache::{
    validate_key, BackingStore, CacheElement, CacheKey, CacheStats, CacheValue,
    ElementAttributes, LruTracker,
};
use crate::error::{CacheError, Result};

#[derive(Debug)]
struct Inner<K, V> {
    /// Key-element storage
    elements: HashMap<K, CacheElement<K, V>>,
    /// LRU access tracker
    lru: LruTracker<K>,
    stats: CacheStats,
    default_attributes: ElementAttributes,
    disposed: bool,
}

impl<K: CacheKey, V: CacheValue> Inner<K, V> {
    fn drop_key(&mut self, key: &K) -> bool {
        let removed = self.elements.remove(key).is_some();
        if removed {
            self.lru.remove(key);
            self.stats.set_total_entries(self.elements.len());
        }
        removed
    }

    /// Removes the element when it has expired; returns true if it did.
    fn expire_if_needed(&mut self, key: &K) -> bool {
        let expired = self
            .elements
            .get(key)
            .map(|element| element.attributes.is_expired())
            .unwrap_or(false);
        if expired {
            self.drop_key(key);
            self.stats.record_expiration();
        }
        expired
    }

    fn live_keys(&mut self) -> Vec<K> {
        let keys: Vec<K> = self.elements.keys().cloned().collect();
        keys.into_iter()
            .filter(|key| !self.expire_if_needed(key))
            .collect()
    }
}

// == Memory Cache ==
/// Thread-safe in-memory region with LRU eviction and expiry support.
#[derive(Debug)]
pub struct MemoryCache<K, V> {
    cache_name: String,
    /// Maximum number of elements, 0 = unbounded
    max_objects: usize,
    inner: Mutex<Inner<K, V>>,
}

impl<K: CacheKey, V: CacheValue> MemoryCache<K, V> {
    // == Constructor ==
    /// Creates a new region holding at most `max_objects` elements.
    pub fn new(cache_name: impl Into<String>, max_objects: usize) -> Self {
        Self {
            cache_name: cache_name.into(),
            max_objects,
            inner: Mutex::new(Inner {
                elements: HashMap::new(),
                lru: LruTracker::new(),
                stats: CacheStats::new(),
                default_attributes: ElementAttributes::new(),
                disposed: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<K, V>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_open(&self) -> Result<MutexGuard<'_, Inner<K, V>>> {
        let guard = self.lock();
        if guard.disposed {
            return Err(CacheError::Disposed(self.cache_name.clone()));
        }
        Ok(guard)
    }

    // == Cleanup Expired ==
    /// Removes all expired elements from the region.
    ///
    /// Returns the number of elements removed.
    pub fn cleanup_expired(&self) -> usize {
        let mut inner = self.lock();
        let expired: Vec<K> = inner
            .elements
            .iter()
            .filter(|(_, element)| element.attributes.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            inner.drop_key(key);
            inner.stats.record_expiration();
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.lock().elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().elements.is_empty()
    }

    pub fn max_objects(&self) -> usize {
        self.max_objects
    }

    pub fn is_disposed(&self) -> bool {
        self.lock().disposed
    }
}

/// Compiles a pattern that must match the whole key string.
pub(crate) fn full_match_regex(pattern: &str) -> Result<Regex> {
    Ok(Regex::new(&format!("^(?:{})$", pattern))?)
}

impl<K: CacheKey, V: CacheValue> BackingStore<K, V> for MemoryCache<K, V> {
    fn cache_name(&self) -> &str {
        &self.cache_name
    }

    // == Get ==
    /// Returns the element if present and not expired. Expired elements are
    /// removed and counted as misses.
    fn get(&self, key: &K) -> Result<Option<CacheElement<K, V>>> {
        let mut inner = self.lock_open()?;

        if inner.expire_if_needed(key) {
            inner.stats.record_miss();
            return Ok(None);
        }

        let found = inner.elements.get_mut(key).map(|element| {
            element.attributes.touch();
            element.clone()
        });
        match found {
            Some(element) => {
                inner.stats.record_hit();
                inner.lru.touch(key);
                Ok(Some(element))
            }
            None => {
                inner.stats.record_miss();
                Ok(None)
            }
        }
    }

    fn get_matching(&self, pattern: &str) -> Result<HashMap<K, CacheElement<K, V>>> {
        let regex = full_match_regex(pattern)?;
        let mut inner = self.lock_open()?;

        let matched = inner
            .live_keys()
            .into_iter()
            .filter(|key| regex.is_match(&key.to_string()))
            .filter_map(|key| {
                inner
                    .elements
                    .get(&key)
                    .map(|element| (key.clone(), element.clone()))
            })
            .collect();
        Ok(matched)
    }

    fn get_key_set(&self) -> Result<HashSet<K>> {
        let mut inner = self.lock_open()?;
        Ok(inner.live_keys().into_iter().collect())
    }

    // == Update ==
    /// Stores an element, overwriting any element under the same key.
    ///
    /// If the region is at capacity, the least recently used element is evicted.
    fn update(&self, element: CacheElement<K, V>) -> Result<()> {
        if let Some(message) = validate_key(&element.key) {
            return Err(CacheError::InvalidArgument(message));
        }

        let mut inner = self.lock_open()?;
        let key = element.key.clone();
        let is_overwrite = inner.elements.contains_key(&key);

        if !is_overwrite && self.max_objects > 0 && inner.elements.len() >= self.max_objects {
            match inner.lru.evict_oldest() {
                Some(evicted) => {
                    inner.elements.remove(&evicted);
                    inner.stats.record_eviction();
                    debug!("Evicted [{}] from [{}]", evicted, self.cache_name);
                }
                None => {
                    return Err(CacheError::Internal(format!(
                        "Region [{}] is full and eviction failed",
                        self.cache_name
                    )))
                }
            }
        }

        inner.elements.insert(key.clone(), element);
        inner.lru.touch(&key);
        let total = inner.elements.len();
        inner.stats.set_total_entries(total);
        Ok(())
    }

    // == Remove ==
    /// Removes one element, or every element covered by a wildcard key.
    fn remove(&self, key: &K) -> Result<bool> {
        let mut inner = self.lock_open()?;

        if !key.is_wildcard() {
            return Ok(inner.drop_key(key));
        }

        let covered: Vec<K> = inner
            .elements
            .keys()
            .filter(|candidate| key.covers(candidate))
            .cloned()
            .collect();
        for candidate in &covered {
            inner.drop_key(candidate);
        }
        debug!(
            "Wildcard [{}] removed {} elements from [{}]",
            key,
            covered.len(),
            self.cache_name
        );
        Ok(!covered.is_empty())
    }

    fn remove_all(&self) -> Result<()> {
        let mut inner = self.lock_open()?;
        inner.elements.clear();
        inner.lru.clear();
        inner.stats.set_total_entries(0);
        Ok(())
    }

    fn dispose(&self) -> Result<()> {
        let mut inner = self.lock();
        inner.elements.clear();
        inner.lru.clear();
        inner.stats.set_total_entries(0);
        inner.disposed = true;
        Ok(())
    }

    fn default_element_attributes(&self) -> ElementAttributes {
        self.lock().default_attributes.clone()
    }

    fn set_default_element_attributes(&self, attributes: ElementAttributes) {
        self.lock().default_attributes = attributes;
    }

    fn stats(&self) -> CacheStats {
        let inner = self.lock();
        let mut stats = inner.stats.clone();
        stats.set_total_entries(inner.elements.len());
        stats
    }
}
