//! Single-region cache facade.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::{
    validate_key, BackingStore, CacheElement, CacheKey, CacheStats, CacheValue,
    ElementAttributes,
};
use crate::error::{CacheError, Result};

// == Cache Access ==
/// Typed get/put/remove over one region, local or remote-backed.
///
/// Reads never fail because the backing store is unhealthy: store errors are
/// logged and reported as "not found". Caller mistakes (bad keys, `put_safe`
/// on an existing key, attributes of a missing key) surface as errors.
pub struct CacheAccess<K: CacheKey, V: CacheValue> {
    store: Arc<dyn BackingStore<K, V>>,
}

impl<K: CacheKey, V: CacheValue> Clone for CacheAccess<K, V> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<K: CacheKey, V: CacheValue> fmt::Debug for CacheAccess<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheAccess")
            .field("cache_name", &self.store.cache_name())
            .finish()
    }
}

impl<K: CacheKey, V: CacheValue> CacheAccess<K, V> {
    pub fn new(store: Arc<dyn BackingStore<K, V>>) -> Self {
        Self { store }
    }

    pub fn cache_name(&self) -> &str {
        self.store.cache_name()
    }

    pub(crate) fn store(&self) -> &Arc<dyn BackingStore<K, V>> {
        &self.store
    }

    // == Get ==
    pub fn get(&self, key: &K) -> Option<V> {
        self.get_cache_element(key).map(|element| element.value)
    }

    /// Returns the cached value, or computes it with `supplier`, stores it and
    /// returns it.
    pub fn get_or_insert_with<F>(&self, key: K, supplier: F) -> Result<V>
    where
        F: FnOnce() -> V,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let value = supplier();
        self.put(key, value.clone())?;
        Ok(value)
    }

    pub fn get_cache_element(&self, key: &K) -> Option<CacheElement<K, V>> {
        match self.store.get(key) {
            Ok(element) => element,
            Err(err) => {
                warn!("Get [{}] from [{}] failed: {}", key, self.cache_name(), err);
                None
            }
        }
    }

    /// Looks up many keys with one store call.
    pub fn get_cache_elements(&self, keys: &HashSet<K>) -> HashMap<K, CacheElement<K, V>> {
        if keys.is_empty() {
            return HashMap::new();
        }
        match self.store.get_multiple(keys) {
            Ok(found) => found,
            Err(err) => {
                warn!(
                    "GetMultiple of {} keys from [{}] failed: {}",
                    keys.len(),
                    self.cache_name(),
                    err
                );
                HashMap::new()
            }
        }
    }

    /// Values whose key string fully matches the regular expression.
    pub fn get_matching(&self, pattern: &str) -> Result<HashMap<K, V>> {
        Ok(self
            .get_matching_cache_elements(pattern)?
            .into_iter()
            .map(|(key, element)| (key, element.value))
            .collect())
    }

    pub fn get_matching_cache_elements(
        &self,
        pattern: &str,
    ) -> Result<HashMap<K, CacheElement<K, V>>> {
        match self.store.get_matching(pattern) {
            Ok(found) => Ok(found),
            Err(err @ CacheError::InvalidArgument(_)) => Err(err),
            Err(err) => {
                warn!(
                    "GetMatching [{}] on [{}] failed: {}",
                    pattern,
                    self.cache_name(),
                    err
                );
                Ok(HashMap::new())
            }
        }
    }

    // == Put ==
    /// Stores a value with a copy of the region's default attributes.
    pub fn put(&self, key: K, value: V) -> Result<()> {
        let attributes = self.store.default_element_attributes();
        self.put_with_attributes(key, value, attributes)
    }

    pub fn put_with_attributes(&self, key: K, value: V, attributes: ElementAttributes) -> Result<()> {
        if let Some(message) = validate_key(&key) {
            return Err(CacheError::InvalidArgument(message));
        }
        debug!("Put [{}] in [{}]", key, self.cache_name());
        let element = CacheElement::new(self.cache_name(), key, value, attributes.fresh_copy());
        self.store.update(element)
    }

    /// Stores a value only if the key is not present yet.
    pub fn put_safe(&self, key: K, value: V) -> Result<()> {
        if self.store.get(&key)?.is_some() {
            return Err(CacheError::ObjectExists(format!(
                "Key [{}] is already in [{}]",
                key,
                self.cache_name()
            )));
        }
        self.put(key, value)
    }

    // == Remove ==
    pub fn remove(&self, key: &K) -> Result<()> {
        self.store.remove(key).map(|_| ())
    }

    /// Removes every element of the region.
    pub fn clear(&self) -> Result<()> {
        self.store.remove_all()
    }

    // == Element Attributes ==
    pub fn get_element_attributes(&self, key: &K) -> Result<ElementAttributes> {
        self.store
            .get(key)?
            .map(|element| element.attributes)
            .ok_or_else(|| self.missing_key(key))
    }

    /// Replaces the attributes of a stored element.
    pub fn reset_element_attributes(&self, key: &K, attributes: ElementAttributes) -> Result<()> {
        let mut element = self.store.get(key)?.ok_or_else(|| self.missing_key(key))?;
        element.attributes = attributes;
        self.store.update(element)
    }

    pub fn default_element_attributes(&self) -> ElementAttributes {
        self.store.default_element_attributes()
    }

    /// Changes the defaults for elements stored from now on.
    pub fn set_default_element_attributes(&self, attributes: ElementAttributes) {
        self.store.set_default_element_attributes(attributes);
    }

    fn missing_key(&self, key: &K) -> CacheError {
        CacheError::InvalidHandle(format!(
            "Key [{}] is not in [{}]",
            key,
            self.cache_name()
        ))
    }

    pub fn stats(&self) -> CacheStats {
        self.store.stats()
    }

    pub fn dispose(&self) -> Result<()> {
        self.store.dispose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    fn access() -> CacheAccess<String, String> {
        CacheAccess::new(Arc::new(MemoryCache::new("facade", 100)))
    }

    fn key(k: &str) -> String {
        k.to_string()
    }

    #[test]
    fn test_put_and_get() {
        let access = access();
        access.put(key("a"), "1".to_string()).unwrap();
        assert_eq!(access.get(&key("a")), Some("1".to_string()));
        assert_eq!(access.get(&key("b")), None);
    }

    #[test]
    fn test_put_rejects_empty_key() {
        let access = access();
        let result = access.put(key(""), "1".to_string());
        assert!(matches!(result, Err(CacheError::InvalidArgument(_))));
    }

    #[test]
    fn test_put_safe_keeps_existing_value() {
        let access = access();
        access.put(key("a"), "1".to_string()).unwrap();

        let result = access.put_safe(key("a"), "2".to_string());

        assert!(matches!(result, Err(CacheError::ObjectExists(_))));
        assert_eq!(access.get(&key("a")), Some("1".to_string()));
        access.put_safe(key("b"), "2".to_string()).unwrap();
        assert_eq!(access.get(&key("b")), Some("2".to_string()));
    }

    #[test]
    fn test_get_or_insert_with_computes_once() {
        let access = access();
        let mut calls = 0;
        let first = access
            .get_or_insert_with(key("a"), || {
                calls += 1;
                "computed".to_string()
            })
            .unwrap();
        let second = access
            .get_or_insert_with(key("a"), || "other".to_string())
            .unwrap();

        assert_eq!(first, "computed");
        assert_eq!(second, "computed");
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_remove() {
        let access = access();
        access.put(key("a"), "1".to_string()).unwrap();
        access.remove(&key("a")).unwrap();
        assert_eq!(access.get(&key("a")), None);
    }

    #[test]
    fn test_get_matching() {
        let access = access();
        access.put(key("item_1"), "1".to_string()).unwrap();
        access.put(key("item_2"), "2".to_string()).unwrap();
        access.put(key("other"), "3".to_string()).unwrap();

        let matched = access.get_matching("item_.*").unwrap();
        assert_eq!(matched.len(), 2);
        assert_eq!(matched.get("item_2"), Some(&"2".to_string()));

        assert!(matches!(
            access.get_matching("[bad"),
            Err(CacheError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_get_cache_elements() {
        let access = access();
        access.put(key("a"), "1".to_string()).unwrap();
        access.put(key("b"), "2".to_string()).unwrap();

        let keys: HashSet<String> = [key("a"), key("b"), key("c")].into_iter().collect();
        let found = access.get_cache_elements(&keys);
        assert_eq!(found.len(), 2);
        assert_eq!(found["a"].cache_name, "facade");
    }

    #[test]
    fn test_reset_element_attributes() {
        let access = access();
        access.put(key("a"), "1".to_string()).unwrap();

        access
            .reset_element_attributes(&key("a"), ElementAttributes::new().with_max_life(60))
            .unwrap();

        assert_eq!(access.get_element_attributes(&key("a")).unwrap().max_life, Some(60));
        assert!(matches!(
            access.reset_element_attributes(&key("missing"), ElementAttributes::new()),
            Err(CacheError::InvalidHandle(_))
        ));
        assert!(matches!(
            access.get_element_attributes(&key("missing")),
            Err(CacheError::InvalidHandle(_))
        ));
    }

    #[test]
    fn test_default_attributes_are_copied_not_aliased() {
        let access = access();
        access.set_default_element_attributes(ElementAttributes::new().with_max_life(100));
        access.put(key("a"), "1".to_string()).unwrap();

        access.set_default_element_attributes(ElementAttributes::new().with_max_life(5));

        assert_eq!(access.get_element_attributes(&key("a")).unwrap().max_life, Some(100));
        access.put(key("b"), "2".to_string()).unwrap();
        assert_eq!(access.get_element_attributes(&key("b")).unwrap().max_life, Some(5));
    }

    #[test]
    fn test_clear_and_stats() {
        let access = access();
        access.put(key("a"), "1".to_string()).unwrap();
        access.get(&key("a"));
        access.clear().unwrap();

        assert_eq!(access.get(&key("a")), None);
        let stats = access.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.total_entries, 0);
    }

    #[test]
    fn test_reads_after_dispose_are_empty() {
        let access = access();
        access.put(key("a"), "1".to_string()).unwrap();
        access.dispose().unwrap();

        assert_eq!(access.get(&key("a")), None);
        assert!(access.get_matching(".*").unwrap().is_empty());
    }
}
