//! Access Module
//!
//! The facades application code calls: single-region [`CacheAccess`],
//! group-scoped [`GroupCacheAccess`] and sharded [`PartitionedCacheAccess`].

mod cache_access;
mod group;
mod group_access;
mod partitioned;

pub use cache_access::CacheAccess;
pub use group::{GroupAttrName, GroupId};
pub use group_access::GroupCacheAccess;
pub use partitioned::{
    numeric_value_for_key, partition_number, PartitionedCacheAccess,
    PARTITIONED_CACHE_ACCESS_HEADING,
};

use crate::cache::{CacheKey, CacheValue};
use crate::error::Result;

// == Region Provider ==
/// Hands out access handles for named regions.
///
/// Registered at startup in place of looking regions up through global state;
/// implemented by the local and the remote cache managers.
pub trait RegionProvider<K: CacheKey, V: CacheValue>: Send + Sync {
    fn region(&self, region_name: &str) -> Result<CacheAccess<K, V>>;
}
