//! Per-region failover wrapper around the remote client.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::{debug, error, info, warn};

use crate::cache::{BackingStore, CacheElement, CacheKey, CacheValue, ElementAttributes};
use crate::config::RemoteHttpCacheAttributes;
use crate::error::{CacheError, Result};
use crate::models::DEFAULT_REQUESTER_ID;
use crate::remote::{
    CacheServiceNonLocal, QueuedOperation, RemoteHttpCacheMonitor, ZombieCacheServiceNonLocal,
};

/// Health of a remote region as seen by its wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Talking to the real client
    Alive,
    /// Failed over to the zombie, waiting for the monitor
    Error,
    Disposed,
}

enum ActiveClient<K: CacheKey, V: CacheValue> {
    Real(Arc<dyn CacheServiceNonLocal<K, V>>),
    Zombie(Arc<ZombieCacheServiceNonLocal<K, V>>),
}

impl<K: CacheKey, V: CacheValue> ActiveClient<K, V> {
    fn service(&self) -> Arc<dyn CacheServiceNonLocal<K, V>> {
        match self {
            ActiveClient::Real(client) => Arc::clone(client),
            ActiveClient::Zombie(zombie) => Arc::clone(zombie) as Arc<dyn CacheServiceNonLocal<K, V>>,
        }
    }
}

// == Remote HTTP Cache ==
/// A remote region that never blocks callers on a broken peer.
///
/// Operations go to the active client. When the real client fails with a
/// transport error the wrapper swaps in a [`ZombieCacheServiceNonLocal`],
/// reports itself to the monitor, answers the failed read as "not found" and
/// queues the failed mutation on the zombie. The monitor later calls
/// [`fix_cache`](Self::fix_cache) with a verified client.
pub struct RemoteHttpCache<K: CacheKey, V: CacheValue> {
    attributes: RemoteHttpCacheAttributes,
    client: Mutex<ActiveClient<K, V>>,
    monitor: Option<Arc<RemoteHttpCacheMonitor<K, V>>>,
    self_ref: Weak<Self>,
    default_attributes: Mutex<ElementAttributes>,
    disposed: AtomicBool,
}

impl<K: CacheKey, V: CacheValue> fmt::Debug for RemoteHttpCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteHttpCache")
            .field("cache_name", &self.attributes.cache_name)
            .field("url", &self.attributes.url)
            .field("status", &self.status())
            .finish()
    }
}

impl<K: CacheKey, V: CacheValue> RemoteHttpCache<K, V> {
    /// Wraps a real client. Errors are reported to `monitor` when one is given.
    pub fn new(
        attributes: RemoteHttpCacheAttributes,
        client: Arc<dyn CacheServiceNonLocal<K, V>>,
        monitor: Option<Arc<RemoteHttpCacheMonitor<K, V>>>,
    ) -> Arc<Self> {
        Self::with_active(attributes, ActiveClient::Real(client), monitor)
    }

    /// Starts out failed over, for when no real client could be created.
    pub fn new_failed(
        attributes: RemoteHttpCacheAttributes,
        monitor: Option<Arc<RemoteHttpCacheMonitor<K, V>>>,
    ) -> Arc<Self> {
        let zombie = Arc::new(ZombieCacheServiceNonLocal::new(attributes.zombie_queue_max_size));
        Self::with_active(attributes, ActiveClient::Zombie(zombie), monitor)
    }

    fn with_active(
        attributes: RemoteHttpCacheAttributes,
        active: ActiveClient<K, V>,
        monitor: Option<Arc<RemoteHttpCacheMonitor<K, V>>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            attributes,
            client: Mutex::new(active),
            monitor,
            self_ref: self_ref.clone(),
            default_attributes: Mutex::new(ElementAttributes::new()),
            disposed: AtomicBool::new(false),
        })
    }

    pub fn attributes(&self) -> &RemoteHttpCacheAttributes {
        &self.attributes
    }

    fn lock_client(&self) -> MutexGuard<'_, ActiveClient<K, V>> {
        self.client.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn status(&self) -> CacheStatus {
        if self.disposed.load(Ordering::SeqCst) {
            return CacheStatus::Disposed;
        }
        match *self.lock_client() {
            ActiveClient::Real(_) => CacheStatus::Alive,
            ActiveClient::Zombie(_) => CacheStatus::Error,
        }
    }

    /// Mutations buffered while failed over.
    pub fn queued_operations(&self) -> usize {
        match &*self.lock_client() {
            ActiveClient::Real(_) => 0,
            ActiveClient::Zombie(zombie) => zombie.queue_len(),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(CacheError::Disposed(self.attributes.cache_name.clone()));
        }
        Ok(())
    }

    fn active_service(&self) -> Arc<dyn CacheServiceNonLocal<K, V>> {
        self.lock_client().service()
    }

    // == Failover ==
    /// Installs a zombie unless one is already active. A failed mutation is
    /// queued on it before the client lock is released, so a concurrent
    /// [`fix_cache`](Self::fix_cache) either replays it or never sees the zombie.
    fn fail_over(&self, operation: &str, err: &CacheError, failed: Option<QueuedOperation<K, V>>) {
        let mut client = self.lock_client();
        if let ActiveClient::Zombie(zombie) = &*client {
            if let Some(failed) = failed {
                zombie.enqueue(failed);
            }
            return;
        }
        let zombie = Arc::new(ZombieCacheServiceNonLocal::new(
            self.attributes.zombie_queue_max_size,
        ));
        if let Some(failed) = failed {
            zombie.enqueue(failed);
        }
        *client = ActiveClient::Zombie(zombie);
        drop(client);

        error!(
            "{} on [{}] at [{}] failed, switching to zombie: {}",
            operation, self.attributes.cache_name, self.attributes.url, err
        );
        if let (Some(monitor), Some(this)) = (&self.monitor, self.self_ref.upgrade()) {
            monitor.notify_error(this);
        }
    }

    /// Runs a read on the active client; a failover-worthy error reads as empty.
    fn read<T: Default>(
        &self,
        operation: &str,
        call: impl FnOnce(&dyn CacheServiceNonLocal<K, V>) -> Result<T>,
    ) -> Result<T> {
        self.ensure_open()?;
        let service = self.active_service();
        match call(service.as_ref()) {
            Err(err) if err.triggers_failover() => {
                self.fail_over(operation, &err, None);
                Ok(T::default())
            }
            other => other,
        }
    }

    /// Runs a mutation on the active client; a failover-worthy error queues it
    /// on the zombie instead.
    ///
    /// While failed over the mutation is queued under the client lock, never
    /// through a zombie handle taken out of it.
    fn mutate(&self, operation: QueuedOperation<K, V>) -> Result<bool> {
        self.ensure_open()?;
        let client = {
            let active = self.lock_client();
            match &*active {
                ActiveClient::Real(client) => Arc::clone(client),
                ActiveClient::Zombie(zombie) => {
                    zombie.enqueue(operation);
                    return Ok(false);
                }
            }
        };
        match operation.apply(client.as_ref()) {
            Err(err) if err.triggers_failover() => {
                self.fail_over("Mutation", &err, Some(operation));
                Ok(false)
            }
            other => other,
        }
    }

    /// Replaces the zombie with a verified client and replays queued mutations.
    ///
    /// The replay happens before the lock is released, so no new operation
    /// reaches the new client ahead of the buffered ones.
    pub fn fix_cache(&self, client: Arc<dyn CacheServiceNonLocal<K, V>>) {
        let mut active = self.lock_client();
        let previous = std::mem::replace(&mut *active, ActiveClient::Real(Arc::clone(&client)));
        if let ActiveClient::Zombie(zombie) = previous {
            let replayed = zombie.propagate_events(client.as_ref());
            info!(
                "Fixed [{}] at [{}], replayed {} queued operations",
                self.attributes.cache_name, self.attributes.url, replayed
            );
        } else {
            debug!("Replaced client of healthy [{}]", self.attributes.cache_name);
        }
    }
}

impl<K: CacheKey, V: CacheValue> BackingStore<K, V> for RemoteHttpCache<K, V> {
    fn cache_name(&self) -> &str {
        &self.attributes.cache_name
    }

    fn get(&self, key: &K) -> Result<Option<CacheElement<K, V>>> {
        self.read("Get", |service| {
            service.get(&self.attributes.cache_name, key, DEFAULT_REQUESTER_ID)
        })
    }

    fn get_multiple(&self, keys: &HashSet<K>) -> Result<HashMap<K, CacheElement<K, V>>> {
        self.read("GetMultiple", |service| {
            service.get_multiple(&self.attributes.cache_name, keys, DEFAULT_REQUESTER_ID)
        })
    }

    fn get_matching(&self, pattern: &str) -> Result<HashMap<K, CacheElement<K, V>>> {
        self.read("GetMatching", |service| {
            service.get_matching(&self.attributes.cache_name, pattern, DEFAULT_REQUESTER_ID)
        })
    }

    fn get_key_set(&self) -> Result<HashSet<K>> {
        self.read("GetKeySet", |service| {
            service.get_key_set(&self.attributes.cache_name, DEFAULT_REQUESTER_ID)
        })
    }

    fn update(&self, element: CacheElement<K, V>) -> Result<()> {
        self.mutate(QueuedOperation::Update {
            element,
            requester_id: DEFAULT_REQUESTER_ID,
        })
        .map(|_| ())
    }

    fn remove(&self, key: &K) -> Result<bool> {
        self.mutate(QueuedOperation::Remove {
            cache_name: self.attributes.cache_name.clone(),
            key: key.clone(),
            requester_id: DEFAULT_REQUESTER_ID,
        })
    }

    fn remove_all(&self) -> Result<()> {
        self.mutate(QueuedOperation::RemoveAll {
            cache_name: self.attributes.cache_name.clone(),
            requester_id: DEFAULT_REQUESTER_ID,
        })
        .map(|_| ())
    }

    /// Tells the peer and stops serving. Peer errors are only logged.
    fn dispose(&self) -> Result<()> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let service = self.active_service();
        if let Err(err) = service.dispose(&self.attributes.cache_name, DEFAULT_REQUESTER_ID) {
            warn!("Dispose of [{}] on the peer failed: {}", self.attributes.cache_name, err);
        }
        info!("Disposed remote cache [{}]", self.attributes.cache_name);
        Ok(())
    }

    fn default_element_attributes(&self) -> ElementAttributes {
        self.default_attributes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set_default_element_attributes(&self, attributes: ElementAttributes) {
        *self
            .default_attributes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = attributes;
    }
}
