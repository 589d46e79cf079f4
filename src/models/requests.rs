//! Wire request envelope
//!
//! Defines the body POSTed by the remote client and decoded by the peer.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cache::{validate_key, CacheElement, CacheKey};

/// Requester id used when the caller does not supply one.
pub const DEFAULT_REQUESTER_ID: i64 = 0;

/// Operation carried by a [`RemoteCacheRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemoteRequestType {
    Get,
    GetMultiple,
    GetMatching,
    GetKeySet,
    Update,
    Remove,
    RemoveAll,
    Dispose,
    AliveCheck,
}

impl RemoteRequestType {
    /// Name sent in the `RequestType` parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteRequestType::Get => "GET",
            RemoteRequestType::GetMultiple => "GET_MULTIPLE",
            RemoteRequestType::GetMatching => "GET_MATCHING",
            RemoteRequestType::GetKeySet => "GET_KEYSET",
            RemoteRequestType::Update => "UPDATE",
            RemoteRequestType::Remove => "REMOVE",
            RemoteRequestType::RemoveAll => "REMOVE_ALL",
            RemoteRequestType::Dispose => "DISPOSE",
            RemoteRequestType::AliveCheck => "ALIVE_CHECK",
        }
    }
}

impl fmt::Display for RemoteRequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One request to the remote peer.
///
/// Exactly one of `key`, `key_set`, `pattern` and `cache_element` is set, and
/// which one depends on `request_type`. Build requests through the
/// constructors so that always holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCacheRequest<K: Eq + std::hash::Hash, V> {
    pub request_type: RemoteRequestType,
    pub cache_name: String,
    pub key: Option<K>,
    pub key_set: Option<HashSet<K>>,
    pub pattern: Option<String>,
    pub cache_element: Option<CacheElement<K, V>>,
    /// Lets a node skip its own updates if events are ever fanned back out
    pub requester_id: i64,
}

impl<K: CacheKey, V> RemoteCacheRequest<K, V> {
    fn bare(request_type: RemoteRequestType, cache_name: &str, requester_id: i64) -> Self {
        Self {
            request_type,
            cache_name: cache_name.to_string(),
            key: None,
            key_set: None,
            pattern: None,
            cache_element: None,
            requester_id,
        }
    }

    pub fn get(cache_name: &str, key: K, requester_id: i64) -> Self {
        Self {
            key: Some(key),
            ..Self::bare(RemoteRequestType::Get, cache_name, requester_id)
        }
    }

    pub fn get_multiple(cache_name: &str, keys: HashSet<K>, requester_id: i64) -> Self {
        Self {
            key_set: Some(keys),
            ..Self::bare(RemoteRequestType::GetMultiple, cache_name, requester_id)
        }
    }

    pub fn get_matching(cache_name: &str, pattern: &str, requester_id: i64) -> Self {
        Self {
            pattern: Some(pattern.to_string()),
            ..Self::bare(RemoteRequestType::GetMatching, cache_name, requester_id)
        }
    }

    pub fn get_key_set(cache_name: &str, requester_id: i64) -> Self {
        Self::bare(RemoteRequestType::GetKeySet, cache_name, requester_id)
    }

    pub fn update(element: CacheElement<K, V>, requester_id: i64) -> Self {
        let cache_name = element.cache_name.clone();
        Self {
            cache_element: Some(element),
            ..Self::bare(RemoteRequestType::Update, &cache_name, requester_id)
        }
    }

    pub fn remove(cache_name: &str, key: K, requester_id: i64) -> Self {
        Self {
            key: Some(key),
            ..Self::bare(RemoteRequestType::Remove, cache_name, requester_id)
        }
    }

    pub fn remove_all(cache_name: &str, requester_id: i64) -> Self {
        Self::bare(RemoteRequestType::RemoveAll, cache_name, requester_id)
    }

    pub fn dispose(cache_name: &str, requester_id: i64) -> Self {
        Self::bare(RemoteRequestType::Dispose, cache_name, requester_id)
    }

    pub fn alive_check(requester_id: i64) -> Self {
        Self::bare(RemoteRequestType::AliveCheck, "", requester_id)
    }

    /// String form of the populated key field, sent as the `Key` parameter.
    pub fn key_parameter(&self) -> Option<String> {
        match self.request_type {
            RemoteRequestType::Get | RemoteRequestType::Remove => {
                self.key.as_ref().map(|key| key.to_string())
            }
            RemoteRequestType::GetMatching => self.pattern.clone(),
            RemoteRequestType::GetMultiple => self.key_set.as_ref().map(|keys| {
                let mut rendered: Vec<String> = keys.iter().map(|key| key.to_string()).collect();
                rendered.sort();
                format!("[{}]", rendered.join(", "))
            }),
            RemoteRequestType::Update => self
                .cache_element
                .as_ref()
                .map(|element| element.key.to_string()),
            _ => None,
        }
    }

    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.cache_name.is_empty() && self.request_type != RemoteRequestType::AliveCheck {
            return Some(format!("{} request without a cache name", self.request_type));
        }
        let missing = match self.request_type {
            RemoteRequestType::Get | RemoteRequestType::Remove => self.key.is_none(),
            RemoteRequestType::GetMultiple => self.key_set.is_none(),
            RemoteRequestType::GetMatching => self.pattern.is_none(),
            RemoteRequestType::Update => self.cache_element.is_none(),
            _ => false,
        };
        if missing {
            return Some(format!("{} request is missing its key field", self.request_type));
        }
        if let Some(element) = &self.cache_element {
            return validate_key(&element.key);
        }
        None
    }
}
