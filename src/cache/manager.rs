//! Local region registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::info;

use crate::access::{CacheAccess, RegionProvider};
use crate::cache::{BackingStore, CacheKey, CacheValue, MemoryCache};
use crate::error::Result;

/// Maps region names to in-memory regions, creating them on first lookup.
#[derive(Debug)]
pub struct LocalCacheManager<K, V> {
    regions: Mutex<HashMap<String, Arc<MemoryCache<K, V>>>>,
    /// Capacity given to every region created by this manager
    max_objects: usize,
}

impl<K: CacheKey, V: CacheValue> LocalCacheManager<K, V> {
    pub fn new(max_objects: usize) -> Self {
        Self {
            regions: Mutex::new(HashMap::new()),
            max_objects,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<MemoryCache<K, V>>>> {
        self.regions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the named region, creating it if needed. A region disposed
    /// through one of its handles is replaced by a fresh one.
    pub fn get_cache(&self, cache_name: &str) -> Arc<MemoryCache<K, V>> {
        let mut regions = self.lock();
        if let Some(region) = regions.get(cache_name) {
            if !region.is_disposed() {
                return Arc::clone(region);
            }
        }
        info!("Creating region [{}] with max_objects={}", cache_name, self.max_objects);
        let region = Arc::new(MemoryCache::new(cache_name, self.max_objects));
        regions.insert(cache_name.to_string(), Arc::clone(&region));
        region
    }

    /// Returns the named region only if it already exists.
    pub fn existing(&self, cache_name: &str) -> Option<Arc<MemoryCache<K, V>>> {
        self.lock().get(cache_name).cloned()
    }

    pub fn region_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Disposes and unregisters a region. Returns false if it was unknown.
    pub fn release(&self, cache_name: &str) -> Result<bool> {
        let removed = self.lock().remove(cache_name);
        match removed {
            Some(region) => {
                region.dispose()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Sweeps expired elements from every region; returns the number removed.
    pub fn cleanup_expired(&self) -> usize {
        let regions: Vec<Arc<MemoryCache<K, V>>> = self.lock().values().cloned().collect();
        regions.iter().map(|region| region.cleanup_expired()).sum()
    }
}

impl<K: CacheKey, V: CacheValue> RegionProvider<K, V> for LocalCacheManager<K, V> {
    fn region(&self, region_name: &str) -> Result<CacheAccess<K, V>> {
        let store: Arc<dyn BackingStore<K, V>> = self.get_cache(region_name);
        Ok(CacheAccess::new(store))
    }
}
