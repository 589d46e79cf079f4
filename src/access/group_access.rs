//! Group-scoped facade: wraps every key as a [`GroupAttrName`] before it
//! reaches the region.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::warn;

use crate::access::{CacheAccess, GroupAttrName, GroupId};
use crate::cache::{BackingStore, CacheKey, CacheValue, ElementAttributes};
use crate::error::Result;

/// Key-wrapping decorator over a region whose keys are group member names.
pub struct GroupCacheAccess<K: CacheKey, V: CacheValue> {
    access: CacheAccess<GroupAttrName<K>, V>,
}

impl<K: CacheKey, V: CacheValue> Clone for GroupCacheAccess<K, V> {
    fn clone(&self) -> Self {
        Self {
            access: self.access.clone(),
        }
    }
}

impl<K: CacheKey, V: CacheValue> GroupCacheAccess<K, V> {
    pub fn new(store: Arc<dyn BackingStore<GroupAttrName<K>, V>>) -> Self {
        Self {
            access: CacheAccess::new(store),
        }
    }

    pub fn from_access(access: CacheAccess<GroupAttrName<K>, V>) -> Self {
        Self { access }
    }

    pub fn cache_name(&self) -> &str {
        self.access.cache_name()
    }

    fn group_id(&self, group: &str) -> GroupId {
        GroupId::new(self.cache_name(), group)
    }

    fn member(&self, name: K, group: &str) -> GroupAttrName<K> {
        GroupAttrName::new(self.group_id(group), name)
    }

    pub fn get_from_group(&self, name: &K, group: &str) -> Option<V> {
        self.access.get(&self.member(name.clone(), group))
    }

    pub fn put_in_group(&self, name: K, group: &str, value: V) -> Result<()> {
        self.access.put(self.member(name, group), value)
    }

    pub fn put_in_group_with(
        &self,
        name: K,
        group: &str,
        value: V,
        attributes: ElementAttributes,
    ) -> Result<()> {
        self.access
            .put_with_attributes(self.member(name, group), value, attributes)
    }

    pub fn remove_from_group(&self, name: &K, group: &str) -> Result<()> {
        self.access.remove(&self.member(name.clone(), group))
    }

    /// Member names stored under `group`.
    ///
    /// Scans the whole key set of the region, so the cost is proportional to
    /// the region size rather than the group size.
    pub fn get_group_keys(&self, group: &str) -> HashSet<K> {
        let group_id = self.group_id(group);
        self.region_keys()
            .into_iter()
            .filter(|key| key.group_id == group_id)
            .filter_map(|key| key.attr_name)
            .collect()
    }

    /// Distinct group names present in the region.
    pub fn get_group_names(&self) -> HashSet<String> {
        self.region_keys()
            .into_iter()
            .filter(|key| key.attr_name.is_some())
            .map(|key| key.group_id.group_name)
            .collect()
    }

    /// Removes every member of `group` with one wildcard removal.
    pub fn invalidate_group(&self, group: &str) -> Result<()> {
        self.access
            .remove(&GroupAttrName::all_members(self.group_id(group)))
    }

    fn region_keys(&self) -> HashSet<GroupAttrName<K>> {
        match self.access.store().get_key_set() {
            Ok(keys) => keys,
            Err(err) => {
                warn!("GetKeySet on [{}] failed: {}", self.cache_name(), err);
                HashSet::new()
            }
        }
    }

    pub fn dispose(&self) -> Result<()> {
        self.access.dispose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::error::CacheError;

    fn group_access() -> GroupCacheAccess<String, String> {
        GroupCacheAccess::new(Arc::new(MemoryCache::new("groups", 100)))
    }

    fn s(v: &str) -> String {
        v.to_string()
    }

    #[test]
    fn test_put_and_get_in_group() {
        let access = group_access();
        access.put_in_group(s("a"), "g1", s("1")).unwrap();

        assert_eq!(access.get_from_group(&s("a"), "g1"), Some(s("1")));
        assert_eq!(access.get_from_group(&s("a"), "g2"), None);
    }

    #[test]
    fn test_remove_from_group() {
        let access = group_access();
        access.put_in_group(s("a"), "g1", s("1")).unwrap();
        access.put_in_group(s("a"), "g2", s("2")).unwrap();

        access.remove_from_group(&s("a"), "g1").unwrap();

        assert_eq!(access.get_from_group(&s("a"), "g1"), None);
        assert_eq!(access.get_from_group(&s("a"), "g2"), Some(s("2")));
    }

    #[test]
    fn test_get_group_keys_and_names() {
        let access = group_access();
        access.put_in_group(s("a"), "g1", s("1")).unwrap();
        access.put_in_group(s("b"), "g1", s("2")).unwrap();
        access.put_in_group(s("c"), "g2", s("3")).unwrap();

        let keys = access.get_group_keys("g1");
        assert_eq!(keys, [s("a"), s("b")].into_iter().collect());

        let names = access.get_group_names();
        assert_eq!(names, [s("g1"), s("g2")].into_iter().collect());
    }

    #[test]
    fn test_invalidate_group_leaves_other_groups() {
        let access = group_access();
        access.put_in_group(s("a"), "g1", s("1")).unwrap();
        access.put_in_group(s("b"), "g1", s("2")).unwrap();
        access.put_in_group(s("a"), "g2", s("3")).unwrap();

        access.invalidate_group("g1").unwrap();

        assert!(access.get_group_keys("g1").is_empty());
        assert_eq!(access.get_from_group(&s("a"), "g2"), Some(s("3")));
    }

    #[test]
    fn test_wildcard_member_is_never_stored() {
        let access = group_access();
        let wildcard: GroupAttrName<String> =
            GroupAttrName::all_members(GroupId::new("groups", "g1"));
        let result = access.access.put(wildcard, s("x"));
        assert!(matches!(result, Err(CacheError::InvalidArgument(_))));
    }
}
