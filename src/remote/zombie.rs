//! Degraded stand-in for an unreachable remote client.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::cache::{CacheElement, CacheKey, CacheValue};
use crate::error::Result;
use crate::remote::CacheServiceNonLocal;

/// A mutation waiting to be replayed against a recovered peer.
#[derive(Debug, Clone, PartialEq)]
pub enum QueuedOperation<K, V> {
    Update {
        element: CacheElement<K, V>,
        requester_id: i64,
    },
    Remove {
        cache_name: String,
        key: K,
        requester_id: i64,
    },
    RemoveAll {
        cache_name: String,
        requester_id: i64,
    },
}

impl<K: CacheKey, V: CacheValue> QueuedOperation<K, V> {
    /// Runs the operation against `service`; returns the removal flag for
    /// `Remove` and `true` otherwise.
    pub fn apply(&self, service: &dyn CacheServiceNonLocal<K, V>) -> Result<bool> {
        match self {
            QueuedOperation::Update {
                element,
                requester_id,
            } => service.update(element.clone(), *requester_id).map(|_| true),
            QueuedOperation::Remove {
                cache_name,
                key,
                requester_id,
            } => service.remove(cache_name, key, *requester_id),
            QueuedOperation::RemoveAll {
                cache_name,
                requester_id,
            } => service.remove_all(cache_name, *requester_id).map(|_| true),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            QueuedOperation::Update { .. } => "update",
            QueuedOperation::Remove { .. } => "remove",
            QueuedOperation::RemoveAll { .. } => "removeAll",
        }
    }
}

// == Zombie Service ==
/// Answers reads with empty results and buffers mutations in a bounded FIFO.
///
/// When full, the oldest queued mutation is dropped to make room. The buffer
/// is best effort: it is lost if the process exits before recovery.
#[derive(Debug)]
pub struct ZombieCacheServiceNonLocal<K, V> {
    max_queue_size: usize,
    queue: Mutex<VecDeque<QueuedOperation<K, V>>>,
}

impl<K: CacheKey, V: CacheValue> ZombieCacheServiceNonLocal<K, V> {
    pub fn new(max_queue_size: usize) -> Self {
        Self {
            max_queue_size,
            queue: Mutex::new(VecDeque::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<QueuedOperation<K, V>>> {
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn max_queue_size(&self) -> usize {
        self.max_queue_size
    }

    pub fn queue_len(&self) -> usize {
        self.lock().len()
    }

    /// Buffers a mutation, dropping the oldest one when the queue is full.
    pub fn enqueue(&self, operation: QueuedOperation<K, V>) {
        if self.max_queue_size == 0 {
            return;
        }
        let mut queue = self.lock();
        if queue.len() >= self.max_queue_size {
            if let Some(dropped) = queue.pop_front() {
                debug!("Zombie queue full, dropping oldest {}", dropped.name());
            }
        }
        queue.push_back(operation);
    }

    /// Replays every queued mutation against `service` in arrival order.
    ///
    /// Failures are logged and skipped. Returns the number that succeeded.
    pub fn propagate_events(&self, service: &dyn CacheServiceNonLocal<K, V>) -> usize {
        let pending: Vec<QueuedOperation<K, V>> = self.lock().drain(..).collect();
        if pending.is_empty() {
            return 0;
        }
        info!("Propagating {} queued operations", pending.len());

        let mut replayed = 0;
        for operation in &pending {
            match operation.apply(service) {
                Ok(_) => replayed += 1,
                Err(err) => warn!("Replay of queued {} failed: {}", operation.name(), err),
            }
        }
        replayed
    }
}

impl<K: CacheKey, V: CacheValue> CacheServiceNonLocal<K, V> for ZombieCacheServiceNonLocal<K, V> {
    fn get(&self, _cache_name: &str, _key: &K, _requester_id: i64) -> Result<Option<CacheElement<K, V>>> {
        Ok(None)
    }

    fn get_multiple(
        &self,
        _cache_name: &str,
        _keys: &HashSet<K>,
        _requester_id: i64,
    ) -> Result<HashMap<K, CacheElement<K, V>>> {
        Ok(HashMap::new())
    }

    fn get_matching(
        &self,
        _cache_name: &str,
        _pattern: &str,
        _requester_id: i64,
    ) -> Result<HashMap<K, CacheElement<K, V>>> {
        Ok(HashMap::new())
    }

    fn get_key_set(&self, _cache_name: &str, _requester_id: i64) -> Result<HashSet<K>> {
        Ok(HashSet::new())
    }

    fn update(&self, element: CacheElement<K, V>, requester_id: i64) -> Result<()> {
        self.enqueue(QueuedOperation::Update {
            element,
            requester_id,
        });
        Ok(())
    }

    fn remove(&self, cache_name: &str, key: &K, requester_id: i64) -> Result<bool> {
        self.enqueue(QueuedOperation::Remove {
            cache_name: cache_name.to_string(),
            key: key.clone(),
            requester_id,
        });
        Ok(false)
    }

    fn remove_all(&self, cache_name: &str, requester_id: i64) -> Result<()> {
        self.enqueue(QueuedOperation::RemoveAll {
            cache_name: cache_name.to_string(),
            requester_id,
        });
        Ok(())
    }

    fn dispose(&self, _cache_name: &str, _requester_id: i64) -> Result<()> {
        Ok(())
    }

    fn is_alive(&self) -> Result<bool> {
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ElementAttributes;
    use crate::error::CacheError;

    /// Records applied operations; fails removals of the key "poison".
    #[derive(Default)]
    struct RecordingService {
        applied: Mutex<Vec<String>>,
    }

    impl CacheServiceNonLocal<String, String> for RecordingService {
        fn get(&self, _: &str, _: &String, _: i64) -> Result<Option<CacheElement<String, String>>> {
            Ok(None)
        }
        fn get_multiple(
            &self,
            _: &str,
            _: &HashSet<String>,
            _: i64,
        ) -> Result<HashMap<String, CacheElement<String, String>>> {
            Ok(HashMap::new())
        }
        fn get_matching(
            &self,
            _: &str,
            _: &str,
            _: i64,
        ) -> Result<HashMap<String, CacheElement<String, String>>> {
            Ok(HashMap::new())
        }
        fn get_key_set(&self, _: &str, _: i64) -> Result<HashSet<String>> {
            Ok(HashSet::new())
        }
        fn update(&self, element: CacheElement<String, String>, _: i64) -> Result<()> {
            self.applied.lock().unwrap().push(format!("update {}", element.key));
            Ok(())
        }
        fn remove(&self, _: &str, key: &String, _: i64) -> Result<bool> {
            if key == "poison" {
                return Err(CacheError::Transport("still flaky".into()));
            }
            self.applied.lock().unwrap().push(format!("remove {}", key));
            Ok(true)
        }
        fn remove_all(&self, cache_name: &str, _: i64) -> Result<()> {
            self.applied.lock().unwrap().push(format!("removeAll {}", cache_name));
            Ok(())
        }
        fn dispose(&self, _: &str, _: i64) -> Result<()> {
            Ok(())
        }
        fn is_alive(&self) -> Result<bool> {
            Ok(true)
        }
    }

    fn element(key: &str) -> CacheElement<String, String> {
        CacheElement::new("region", key.to_string(), "v".to_string(), ElementAttributes::new())
    }

    #[test]
    fn test_reads_are_empty_and_not_alive() {
        let zombie: ZombieCacheServiceNonLocal<String, String> = ZombieCacheServiceNonLocal::new(10);
        let service: &dyn CacheServiceNonLocal<String, String> = &zombie;

        assert!(service.get("region", &"k".to_string(), 0).unwrap().is_none());
        assert!(service.get_matching("region", ".*", 0).unwrap().is_empty());
        assert!(service.get_key_set("region", 0).unwrap().is_empty());
        assert!(!service.is_alive().unwrap());
    }

    #[test]
    fn test_queue_drops_oldest_when_full() {
        let zombie = ZombieCacheServiceNonLocal::new(2);
        zombie.update(element("a"), 0).unwrap();
        zombie.update(element("b"), 0).unwrap();
        zombie.update(element("c"), 0).unwrap();

        assert_eq!(zombie.queue_len(), 2);

        let target = RecordingService::default();
        assert_eq!(zombie.propagate_events(&target), 2);
        assert_eq!(*target.applied.lock().unwrap(), vec!["update b", "update c"]);
    }

    #[test]
    fn test_zero_capacity_queues_nothing() {
        let zombie = ZombieCacheServiceNonLocal::new(0);
        zombie.update(element("a"), 0).unwrap();
        assert_eq!(zombie.queue_len(), 0);
    }

    #[test]
    fn test_replay_is_fifo_and_skips_failures() {
        let zombie = ZombieCacheServiceNonLocal::new(10);
        zombie.update(element("a"), 0).unwrap();
        zombie.remove("region", &"poison".to_string(), 0).unwrap();
        zombie.remove("region", &"a".to_string(), 0).unwrap();
        zombie.remove_all("region", 0).unwrap();

        let target = RecordingService::default();
        let replayed = zombie.propagate_events(&target);

        assert_eq!(replayed, 3);
        assert_eq!(
            *target.applied.lock().unwrap(),
            vec!["update a", "remove a", "removeAll region"]
        );
        assert_eq!(zombie.queue_len(), 0);
    }
}
