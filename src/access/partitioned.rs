//! Key-routed access over N independently managed regions.

use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, error, info, warn};

use crate::access::{CacheAccess, RegionProvider};
use crate::cache::{CacheElement, CacheKey, CacheValue, ElementAttributes};
use crate::config::PartitionConfig;
use crate::error::{CacheError, Result};

/// Default property heading for partition settings.
pub const PARTITIONED_CACHE_ACCESS_HEADING: &str = "PartitionedCacheAccess";

// == Partition Routing ==
/// Numeric routing value of a key.
///
/// The key's string form is parsed as a base-10 integer; anything else falls
/// back to a 31-multiplier polynomial hash over its UTF-16 units, which is
/// stable across processes.
pub fn numeric_value_for_key<K: Display>(key: &K) -> i64 {
    let rendered = key.to_string();
    match rendered.parse::<i64>() {
        Ok(value) => value,
        Err(_) => {
            let hash = rendered
                .encode_utf16()
                .fold(0i32, |acc, unit| acc.wrapping_mul(31).wrapping_add(unit as i32));
            debug!(
                "Couldn't convert [{}] into a number, using hash [{}]",
                rendered, hash
            );
            i64::from(hash)
        }
    }
}

/// Maps a routing value into `[0, number_of_partitions)`.
///
/// Uses floored modulo so negative values still land in range.
pub fn partition_number(numeric_value: i64, number_of_partitions: usize) -> usize {
    debug_assert!(number_of_partitions > 0);
    numeric_value.rem_euclid(number_of_partitions as i64) as usize
}

enum PartitionState<K: CacheKey, V: CacheValue> {
    Uninitialized,
    Ready(Arc<[CacheAccess<K, V>]>),
    Disposed,
}

// == Partitioned Cache Access ==
/// Shards one logical region across `numberOfPartitions` regions named
/// `prefix_0 .. prefix_{n-1}`.
///
/// The partition table is built once, on first use, from the property map
/// (environment overrides apply). When configuration is missing every
/// operation is a logged no-op returning an empty result. `dispose` tears the
/// table down; the instance then stays inert until [`initialize`] is called.
///
/// [`initialize`]: PartitionedCacheAccess::initialize
pub struct PartitionedCacheAccess<K: CacheKey, V: CacheValue> {
    provider: Arc<dyn RegionProvider<K, V>>,
    properties: HashMap<String, String>,
    properties_heading: String,
    state: Mutex<PartitionState<K, V>>,
}

impl<K: CacheKey, V: CacheValue> PartitionedCacheAccess<K, V> {
    pub fn new(provider: Arc<dyn RegionProvider<K, V>>, properties: HashMap<String, String>) -> Self {
        Self {
            provider,
            properties,
            properties_heading: PARTITIONED_CACHE_ACCESS_HEADING.to_string(),
            state: Mutex::new(PartitionState::Uninitialized),
        }
    }

    /// Reads partition settings under `heading` instead of the default.
    pub fn with_properties_heading(mut self, heading: impl Into<String>) -> Self {
        self.properties_heading = heading.into();
        self
    }

    fn lock(&self) -> MutexGuard<'_, PartitionState<K, V>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn build_partitions(&self) -> Result<Arc<[CacheAccess<K, V>]>> {
        let config = PartitionConfig::from_properties(&self.properties, &self.properties_heading)?;
        let partitions = (0..config.number_of_partitions)
            .map(|index| self.provider.region(&config.region_name(index)))
            .collect::<Result<Vec<_>>>()?;
        info!(
            "Initialized {} partitions with prefix [{}]",
            config.number_of_partitions, config.partition_region_name_prefix
        );
        Ok(partitions.into())
    }

    /// Builds the partition table, replacing a disposed one.
    ///
    /// A no-op when already initialized.
    pub fn initialize(&self) -> Result<()> {
        let mut state = self.lock();
        if let PartitionState::Ready(_) = *state {
            return Ok(());
        }
        let partitions = self.build_partitions()?;
        *state = PartitionState::Ready(partitions);
        Ok(())
    }

    /// The partition table, initializing it lazily before first use.
    fn partitions(&self) -> Option<Arc<[CacheAccess<K, V>]>> {
        let mut state = self.lock();
        match &*state {
            PartitionState::Ready(partitions) => return Some(Arc::clone(partitions)),
            PartitionState::Disposed => return None,
            PartitionState::Uninitialized => {}
        }
        match self.build_partitions() {
            Ok(partitions) => {
                *state = PartitionState::Ready(Arc::clone(&partitions));
                Some(partitions)
            }
            Err(err) => {
                error!("Couldn't configure partitioned access: {}", err);
                None
            }
        }
    }

    fn partition_index(key: &K, number_of_partitions: usize) -> usize {
        let index = partition_number(numeric_value_for_key(key), number_of_partitions);
        debug!("Using partition [{}] for key [{}]", index, key);
        index
    }

    fn partition_of(&self, key: &K) -> Option<CacheAccess<K, V>> {
        let partitions = self.partitions()?;
        let index = Self::partition_index(key, partitions.len());
        Some(partitions[index].clone())
    }

    pub fn number_of_partitions(&self) -> Option<usize> {
        self.partitions().map(|partitions| partitions.len())
    }

    /// Index of the partition `key` routes to.
    pub fn partition_for_key(&self, key: &K) -> Option<usize> {
        self.partitions()
            .map(|partitions| Self::partition_index(key, partitions.len()))
    }

    // == Get ==
    pub fn get(&self, key: &K) -> Option<V> {
        self.partition_of(key)?.get(key)
    }

    /// Returns the cached value or computes, stores and returns it.
    ///
    /// The computed value is returned unstored when no partitions exist.
    pub fn get_or_insert_with<F>(&self, key: K, supplier: F) -> Result<V>
    where
        F: FnOnce() -> V,
    {
        match self.partition_of(&key) {
            Some(partition) => partition.get_or_insert_with(key, supplier),
            None => Ok(supplier()),
        }
    }

    pub fn get_cache_element(&self, key: &K) -> Option<CacheElement<K, V>> {
        self.partition_of(key)?.get_cache_element(key)
    }

    /// Groups `keys` by partition and issues one batched lookup per partition.
    pub fn get_cache_elements(&self, keys: &HashSet<K>) -> HashMap<K, CacheElement<K, V>> {
        let Some(partitions) = self.partitions() else {
            return HashMap::new();
        };

        let mut by_partition: HashMap<usize, HashSet<K>> = HashMap::new();
        for key in keys {
            by_partition
                .entry(Self::partition_index(key, partitions.len()))
                .or_default()
                .insert(key.clone());
        }

        let mut found = HashMap::new();
        for (index, partition_keys) in by_partition {
            found.extend(partitions[index].get_cache_elements(&partition_keys));
        }
        found
    }

    /// Broadcast: queries every partition and unions the results.
    pub fn get_matching(&self, pattern: &str) -> Result<HashMap<K, V>> {
        Ok(self
            .get_matching_cache_elements(pattern)?
            .into_iter()
            .map(|(key, element)| (key, element.value))
            .collect())
    }

    /// Broadcast: queries every partition and unions the results.
    pub fn get_matching_cache_elements(
        &self,
        pattern: &str,
    ) -> Result<HashMap<K, CacheElement<K, V>>> {
        let Some(partitions) = self.partitions() else {
            return Ok(HashMap::new());
        };
        let mut found = HashMap::new();
        for partition in partitions.iter() {
            found.extend(partition.get_matching_cache_elements(pattern)?);
        }
        Ok(found)
    }

    // == Put ==
    pub fn put(&self, key: K, value: V) -> Result<()> {
        let Some(partition) = self.partition_of(&key) else {
            return Ok(());
        };
        partition.put(key.clone(), value).map_err(|err| {
            error!(
                "Problem putting value for key [{}] in cache [{}]: {}",
                key,
                partition.cache_name(),
                err
            );
            err
        })
    }

    pub fn put_with_attributes(&self, key: K, value: V, attributes: ElementAttributes) -> Result<()> {
        match self.partition_of(&key) {
            Some(partition) => partition.put_with_attributes(key, value, attributes),
            None => Ok(()),
        }
    }

    pub fn put_safe(&self, key: K, value: V) -> Result<()> {
        match self.partition_of(&key) {
            Some(partition) => partition.put_safe(key, value),
            None => Ok(()),
        }
    }

    // == Remove ==
    pub fn remove(&self, key: &K) -> Result<()> {
        let Some(partition) = self.partition_of(key) else {
            return Ok(());
        };
        partition.remove(key).map_err(|err| {
            error!(
                "Problem removing value for key [{}] in cache [{}]: {}",
                key,
                partition.cache_name(),
                err
            );
            err
        })
    }

    /// Clears every partition.
    pub fn clear(&self) -> Result<()> {
        if let Some(partitions) = self.partitions() {
            for partition in partitions.iter() {
                partition.clear()?;
            }
        }
        Ok(())
    }

    // == Element Attributes ==
    pub fn get_element_attributes(&self, key: &K) -> Result<ElementAttributes> {
        match self.partition_of(key) {
            Some(partition) => partition.get_element_attributes(key),
            None => Err(CacheError::InvalidHandle(format!(
                "Key [{}] has no partition, access is not initialized",
                key
            ))),
        }
    }

    pub fn reset_element_attributes(&self, key: &K, attributes: ElementAttributes) -> Result<()> {
        match self.partition_of(key) {
            Some(partition) => partition.reset_element_attributes(key, attributes),
            None => Ok(()),
        }
    }

    /// Defaults of the first partition; all partitions share them when set
    /// through [`set_default_element_attributes`].
    ///
    /// [`set_default_element_attributes`]: PartitionedCacheAccess::set_default_element_attributes
    pub fn default_element_attributes(&self) -> Option<ElementAttributes> {
        self.partitions()
            .and_then(|partitions| partitions.first().map(|p| p.default_element_attributes()))
    }

    pub fn set_default_element_attributes(&self, attributes: ElementAttributes) {
        if let Some(partitions) = self.partitions() {
            for partition in partitions.iter() {
                partition.set_default_element_attributes(attributes.clone());
            }
        }
    }

    /// One stats line per partition.
    pub fn stats(&self) -> String {
        let Some(partitions) = self.partitions() else {
            return String::new();
        };
        partitions
            .iter()
            .map(|partition| format!("[{}] {}\n", partition.cache_name(), partition.stats()))
            .collect()
    }

    /// Disposes every partition and drops the partition table.
    pub fn dispose(&self) -> Result<()> {
        let mut state = self.lock();
        let previous = std::mem::replace(&mut *state, PartitionState::Disposed);
        if let PartitionState::Ready(partitions) = previous {
            for partition in partitions.iter() {
                if let Err(err) = partition.dispose() {
                    warn!("Dispose of [{}] failed: {}", partition.cache_name(), err);
                }
            }
        }
        Ok(())
    }
}
