//! Cache Module
//!
//! Element model, the backing store contract every region implements, and the
//! in-memory store with TTL expiration and LRU eviction.

mod element;
mod lru;
mod manager;
mod memory;
mod stats;


use std::collections::{HashMap, HashSet};
use std::fmt::{Debug, Display};
use std::hash::Hash;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

// Re-export public types
pub use element::{current_timestamp_ms, CacheElement, ElementAttributes};
pub use lru::LruTracker;
pub use manager::LocalCacheManager;
pub use memory::MemoryCache;
pub use stats::CacheStats;

// == Public Constants ==
/// Maximum allowed length of a key's string form in bytes
pub const MAX_KEY_LENGTH: usize = 512;

// == Key and Value Bounds ==
/// Bounds every cache key satisfies.
///
/// The string form (`Display`) is what partition routing, pattern matching and
/// the wire parameters see.
pub trait CacheKey:
    Clone + Eq + Hash + Debug + Display + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// True for keys that address a set of stored keys rather than one.
    fn is_wildcard(&self) -> bool {
        false
    }

    /// Whether removing `self` removes `candidate`.
    fn covers(&self, candidate: &Self) -> bool {
        self == candidate
    }
}

macro_rules! plain_cache_key {
    ($($t:ty),*) => {
        $(impl CacheKey for $t {})*
    };
}

plain_cache_key!(String, i32, i64, u32, u64, usize);

/// Bounds every cached value satisfies.
pub trait CacheValue: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Validates a key before it is stored.
///
/// Returns an error message if validation fails, None if valid.
pub fn validate_key<K: CacheKey>(key: &K) -> Option<String> {
    if key.is_wildcard() {
        return Some(format!("Key [{}] is a group wildcard and cannot be stored", key));
    }
    let rendered = key.to_string();
    if rendered.is_empty() {
        return Some("Key cannot be empty".to_string());
    }
    if rendered.len() > MAX_KEY_LENGTH {
        return Some(format!(
            "Key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        ));
    }
    None
}

// == Backing Store ==
/// One named region of elements. Implemented by the in-memory store and by the
/// remote HTTP failover cache; the access facades only talk to this trait.
pub trait BackingStore<K: CacheKey, V: CacheValue>: Send + Sync {
    fn cache_name(&self) -> &str;

    fn get(&self, key: &K) -> Result<Option<CacheElement<K, V>>>;

    fn get_multiple(&self, keys: &HashSet<K>) -> Result<HashMap<K, CacheElement<K, V>>> {
        let mut found = HashMap::new();
        for key in keys {
            if let Some(element) = self.get(key)? {
                found.insert(key.clone(), element);
            }
        }
        Ok(found)
    }

    /// Elements whose key string fully matches the regular expression.
    fn get_matching(&self, pattern: &str) -> Result<HashMap<K, CacheElement<K, V>>>;

    fn get_key_set(&self) -> Result<HashSet<K>>;

    fn update(&self, element: CacheElement<K, V>) -> Result<()>;

    /// Returns whether anything was removed.
    fn remove(&self, key: &K) -> Result<bool>;

    fn remove_all(&self) -> Result<()>;

    fn dispose(&self) -> Result<()>;

    fn default_element_attributes(&self) -> ElementAttributes;

    fn set_default_element_attributes(&self, attributes: ElementAttributes);

    fn stats(&self) -> CacheStats {
        CacheStats::new()
    }
}
