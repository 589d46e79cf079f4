//! Registry of remote caches and owner of the recovery monitor.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{error, info, warn};

use crate::access::{CacheAccess, RegionProvider};
use crate::cache::{BackingStore, CacheKey, CacheValue};
use crate::config::{MonitorConfig, RemoteHttpCacheAttributes};
use crate::error::{CacheError, Result};
use crate::remote::{CacheStatus, RemoteHttpCache, RemoteHttpCacheMonitor, RemoteHttpClientFactory};

type Registry<K, V> = HashMap<(String, String), Arc<RemoteHttpCache<K, V>>>;

// == Remote HTTP Cache Manager ==
/// Hands out one [`RemoteHttpCache`] per (region, endpoint) pair.
///
/// Owns the monitor thread: it starts in [`new`](Self::new) and stops in
/// [`close`](Self::close), which also runs on drop.
pub struct RemoteHttpCacheManager<K: CacheKey, V: CacheValue> {
    default_attributes: RemoteHttpCacheAttributes,
    factory: Arc<dyn RemoteHttpClientFactory<K, V>>,
    monitor: Arc<RemoteHttpCacheMonitor<K, V>>,
    caches: Mutex<Registry<K, V>>,
    closed: AtomicBool,
}

impl<K: CacheKey, V: CacheValue> RemoteHttpCacheManager<K, V> {
    /// # Arguments
    /// * `default_attributes` - settings for regions requested by name only
    /// * `factory` - creates clients for new regions and for recovery attempts
    /// * `monitor_config` - mode and idle period of the recovery monitor
    pub fn new(
        default_attributes: RemoteHttpCacheAttributes,
        factory: Arc<dyn RemoteHttpClientFactory<K, V>>,
        monitor_config: MonitorConfig,
    ) -> Result<Self> {
        let monitor = RemoteHttpCacheMonitor::new(Arc::clone(&factory), &monitor_config);
        monitor.start()?;
        info!(
            "Remote cache manager for [{}] started, monitor in {:?} mode",
            default_attributes.url, monitor_config.mode
        );
        Ok(Self {
            default_attributes,
            factory,
            monitor,
            caches: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Registry<K, V>> {
        self.caches.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn monitor(&self) -> &Arc<RemoteHttpCacheMonitor<K, V>> {
        &self.monitor
    }

    /// Region `cache_name` on the default endpoint.
    pub fn get_cache(&self, cache_name: &str) -> Result<Arc<RemoteHttpCache<K, V>>> {
        self.get_cache_with(self.default_attributes.for_region(cache_name))
    }

    /// Lookup-or-create for the region and endpoint named by `attributes`.
    ///
    /// When no client can be created the region starts failed over and the
    /// monitor takes over.
    pub fn get_cache_with(
        &self,
        attributes: RemoteHttpCacheAttributes,
    ) -> Result<Arc<RemoteHttpCache<K, V>>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CacheError::Disposed("Remote cache manager is closed".to_string()));
        }
        let id = (attributes.cache_name.clone(), attributes.url.clone());
        let mut caches = self.lock();
        if let Some(cache) = caches.get(&id) {
            if cache.status() != CacheStatus::Disposed {
                return Ok(Arc::clone(cache));
            }
        }

        let monitor = Some(Arc::clone(&self.monitor));
        let cache = match self.factory.create(&attributes) {
            Ok(client) => RemoteHttpCache::new(attributes, client, monitor),
            Err(err) => {
                error!(
                    "Couldn't create client for [{}] at [{}], starting on zombie: {}",
                    id.0, id.1, err
                );
                let cache = RemoteHttpCache::new_failed(attributes, monitor);
                self.monitor.notify_error(Arc::clone(&cache));
                cache
            }
        };
        info!("Created remote cache [{}] at [{}]", id.0, id.1);
        caches.insert(id, Arc::clone(&cache));
        Ok(cache)
    }

    /// Region names currently registered, sorted.
    pub fn cache_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().map(|(name, _)| name.clone()).collect();
        names.sort();
        names.dedup();
        names
    }

    /// Disposes and unregisters every instance of `cache_name`.
    ///
    /// Returns false if none was registered.
    pub fn release(&self, cache_name: &str) -> Result<bool> {
        let released: Vec<Arc<RemoteHttpCache<K, V>>> = {
            let mut caches = self.lock();
            let ids: Vec<(String, String)> = caches
                .keys()
                .filter(|(name, _)| name == cache_name)
                .cloned()
                .collect();
            ids.iter().filter_map(|id| caches.remove(id)).collect()
        };
        for cache in &released {
            cache.dispose()?;
        }
        Ok(!released.is_empty())
    }

    /// Disposes every region and stops the monitor.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let caches: Vec<Arc<RemoteHttpCache<K, V>>> = self.lock().drain().map(|(_, c)| c).collect();
        for cache in caches {
            if let Err(err) = cache.dispose() {
                warn!("Dispose of [{}] failed: {}", cache.cache_name(), err);
            }
        }
        self.monitor.shutdown();
        info!("Remote cache manager closed");
    }
}

impl<K: CacheKey, V: CacheValue> Drop for RemoteHttpCacheManager<K, V> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<K: CacheKey, V: CacheValue> RegionProvider<K, V> for RemoteHttpCacheManager<K, V> {
    fn region(&self, region_name: &str) -> Result<CacheAccess<K, V>> {
        let store: Arc<dyn BackingStore<K, V>> = self.get_cache(region_name)?;
        Ok(CacheAccess::new(store))
    }
}
