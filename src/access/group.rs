//! Composite keys that namespace group members inside one region.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cache::CacheKey;

/// Identifies one group within a region.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId {
    pub cache_name: String,
    pub group_name: String,
}

impl GroupId {
    pub fn new(cache_name: impl Into<String>, group_name: impl Into<String>) -> Self {
        Self {
            cache_name: cache_name.into(),
            group_name: group_name.into(),
        }
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[groupId={}, {}]", self.cache_name, self.group_name)
    }
}

/// A group member key.
///
/// `attr_name == None` is the wildcard for "every member of the group". It
/// only ever addresses removal and never equals a stored member key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupAttrName<K> {
    pub group_id: GroupId,
    pub attr_name: Option<K>,
}

impl<K> GroupAttrName<K> {
    pub fn new(group_id: GroupId, attr_name: K) -> Self {
        Self {
            group_id,
            attr_name: Some(attr_name),
        }
    }

    pub fn all_members(group_id: GroupId) -> Self {
        Self {
            group_id,
            attr_name: None,
        }
    }
}

impl<K: fmt::Display> fmt::Display for GroupAttrName<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.attr_name {
            Some(name) => write!(f, "{}:{}", self.group_id, name),
            None => write!(f, "{}:*", self.group_id),
        }
    }
}

impl<K: CacheKey> CacheKey for GroupAttrName<K> {
    fn is_wildcard(&self) -> bool {
        self.attr_name.is_none()
    }

    fn covers(&self, candidate: &Self) -> bool {
        match self.attr_name {
            Some(_) => self == candidate,
            None => candidate.attr_name.is_some() && candidate.group_id == self.group_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(group: &str, name: &str) -> GroupAttrName<String> {
        GroupAttrName::new(GroupId::new("region", group), name.to_string())
    }

    #[test]
    fn test_wildcard_covers_group_members_only() {
        let wildcard: GroupAttrName<String> = GroupAttrName::all_members(GroupId::new("region", "g1"));

        assert!(wildcard.is_wildcard());
        assert!(wildcard.covers(&member("g1", "a")));
        assert!(!wildcard.covers(&member("g2", "a")));
    }

    #[test]
    fn test_wildcard_never_equals_member() {
        let wildcard: GroupAttrName<String> = GroupAttrName::all_members(GroupId::new("region", "g1"));
        assert_ne!(wildcard, member("g1", "a"));
        assert!(!member("g1", "a").is_wildcard());
    }

    #[test]
    fn test_display() {
        assert_eq!(member("g1", "a").to_string(), "[groupId=region, g1]:a");
    }
}
