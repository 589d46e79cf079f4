//! Recovery daemon for failed-over remote caches.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::cache::{CacheKey, CacheValue};
use crate::config::{MonitorConfig, MonitorMode};
use crate::error::{CacheError, Result};
use crate::remote::{CacheStatus, RemoteHttpCache, RemoteHttpClientFactory};

/// Watch-set key: region name and endpoint.
type CacheId = (String, String);

struct MonitorState<K: CacheKey, V: CacheValue> {
    caches: HashMap<CacheId, Arc<RemoteHttpCache<K, V>>>,
    /// False while some watched cache still needs fixing
    all_right: bool,
    shutdown: bool,
}

// == Monitor ==
/// Background thread that restores caches running on a zombie.
///
/// In [`MonitorMode::Error`] the thread sleeps on a condition variable until a
/// cache reports an error, then retries every idle period until all watched
/// caches are fixed. In [`MonitorMode::Time`] it re-scans every idle period
/// unconditionally. Each scan creates a fresh client per failed cache, checks
/// that it is alive and hands it to [`RemoteHttpCache::fix_cache`].
pub struct RemoteHttpCacheMonitor<K: CacheKey, V: CacheValue> {
    factory: Arc<dyn RemoteHttpClientFactory<K, V>>,
    mode: MonitorMode,
    idle_period: Mutex<Duration>,
    state: Mutex<MonitorState<K, V>>,
    wakeup: Condvar,
    worker: Mutex<Option<JoinHandle<()>>>,
    cycles: AtomicU64,
    alive_checks: AtomicU64,
}

impl<K: CacheKey, V: CacheValue> RemoteHttpCacheMonitor<K, V> {
    pub fn new(factory: Arc<dyn RemoteHttpClientFactory<K, V>>, config: &MonitorConfig) -> Arc<Self> {
        Arc::new(Self {
            factory,
            mode: config.mode,
            idle_period: Mutex::new(config.idle_period),
            state: Mutex::new(MonitorState {
                caches: HashMap::new(),
                all_right: true,
                shutdown: false,
            }),
            wakeup: Condvar::new(),
            worker: Mutex::new(None),
            cycles: AtomicU64::new(0),
            alive_checks: AtomicU64::new(0),
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, MonitorState<K, V>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn mode(&self) -> MonitorMode {
        self.mode
    }

    pub fn idle_period(&self) -> Duration {
        *self
            .idle_period
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Lengthens the idle period. Shorter values are ignored.
    pub fn set_idle_period(&self, period: Duration) {
        let mut current = self
            .idle_period
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if period > *current {
            *current = period;
        }
    }

    /// Scans that actually ran.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    pub fn alive_checks(&self) -> u64 {
        self.alive_checks.load(Ordering::SeqCst)
    }

    pub fn watched(&self) -> usize {
        self.lock_state().caches.len()
    }

    /// Starts the background thread. Calling it again is a no-op.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut worker = self.worker.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if worker.is_some() {
            return Ok(());
        }
        let monitor = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("remote-http-cache-monitor".to_string())
            .spawn(move || monitor.run())
            .map_err(|err| CacheError::Internal(format!("Couldn't start monitor thread: {}", err)))?;
        *worker = Some(handle);
        Ok(())
    }

    /// Adds `cache` to the watch set and wakes the thread.
    pub fn notify_error(&self, cache: Arc<RemoteHttpCache<K, V>>) {
        let id = (cache.attributes().cache_name.clone(), cache.attributes().url.clone());
        info!("Notified of error in [{}] at [{}]", id.0, id.1);
        let mut state = self.lock_state();
        state.caches.insert(id, cache);
        state.all_right = false;
        self.wakeup.notify_all();
    }

    /// Stops the thread and drops the watch set. In-flight recovery is abandoned.
    pub fn shutdown(&self) {
        {
            let mut state = self.lock_state();
            if state.shutdown {
                return;
            }
            state.shutdown = true;
            state.caches.clear();
            self.wakeup.notify_all();
        }
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                warn!("Monitor thread panicked");
            }
        }
        info!("Monitor shut down");
    }

    fn run(&self) {
        info!(
            "Monitor started in {:?} mode, idle period {:?}",
            self.mode,
            self.idle_period()
        );
        loop {
            {
                let mut state = self.lock_state();
                if self.mode == MonitorMode::Error {
                    state = self
                        .wakeup
                        .wait_while(state, |s| s.all_right && !s.shutdown)
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                }
                if state.shutdown {
                    break;
                }
                // work may reset this while it runs
                state.all_right = true;
            }

            self.do_work();

            let state = self.lock_state();
            let (state, _) = self
                .wakeup
                .wait_timeout_while(state, self.idle_period(), |s| !s.shutdown)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if state.shutdown {
                break;
            }
        }
        info!("Monitor stopped");
    }

    /// One scan over the watch set.
    pub fn do_work(&self) {
        let watched: Vec<(CacheId, Arc<RemoteHttpCache<K, V>>)> = self
            .lock_state()
            .caches
            .iter()
            .map(|(id, cache)| (id.clone(), Arc::clone(cache)))
            .collect();
        self.cycles.fetch_add(1, Ordering::SeqCst);
        debug!("Monitor scanning {} caches", watched.len());

        for (id, cache) in watched {
            if cache.status() != CacheStatus::Error {
                self.lock_state().caches.remove(&id);
                continue;
            }

            let client = match self.factory.create(cache.attributes()) {
                Ok(client) => client,
                Err(err) => {
                    warn!("Couldn't create client for [{}]: {}", id.0, err);
                    self.mark_not_all_right();
                    continue;
                }
            };

            self.alive_checks.fetch_add(1, Ordering::SeqCst);
            match client.is_alive() {
                Ok(true) => {
                    cache.fix_cache(client);
                    self.lock_state().caches.remove(&id);
                }
                Ok(false) => {
                    debug!("[{}] at [{}] is still down", id.0, id.1);
                    self.mark_not_all_right();
                }
                Err(err) => {
                    warn!("Alive check for [{}] at [{}] failed: {}", id.0, id.1, err);
                    self.mark_not_all_right();
                }
            }
        }
    }

    fn mark_not_all_right(&self) {
        self.lock_state().all_right = false;
    }
}
