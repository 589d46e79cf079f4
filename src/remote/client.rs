//! Typed remote cache operations over the HTTP dispatcher.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::cache::{CacheElement, CacheKey, CacheValue};
use crate::config::RemoteHttpCacheAttributes;
use crate::error::{CacheError, Result};
use crate::models::RemoteCacheRequest;
use crate::remote::RemoteHttpCacheDispatcher;

// == Non-local Cache Service ==
/// Operations a remote region supports. Implemented by the HTTP client and
/// by the zombie that stands in for it while the peer is unreachable.
///
/// `requester_id` identifies the calling node; it is carried on the wire but
/// not used for routing.
pub trait CacheServiceNonLocal<K: CacheKey, V: CacheValue>: Send + Sync {
    fn get(&self, cache_name: &str, key: &K, requester_id: i64) -> Result<Option<CacheElement<K, V>>>;

    fn get_multiple(
        &self,
        cache_name: &str,
        keys: &HashSet<K>,
        requester_id: i64,
    ) -> Result<HashMap<K, CacheElement<K, V>>>;

    fn get_matching(
        &self,
        cache_name: &str,
        pattern: &str,
        requester_id: i64,
    ) -> Result<HashMap<K, CacheElement<K, V>>>;

    fn get_key_set(&self, cache_name: &str, requester_id: i64) -> Result<HashSet<K>>;

    fn update(&self, element: CacheElement<K, V>, requester_id: i64) -> Result<()>;

    /// Returns whether the peer reported removing anything.
    fn remove(&self, cache_name: &str, key: &K, requester_id: i64) -> Result<bool>;

    fn remove_all(&self, cache_name: &str, requester_id: i64) -> Result<()>;

    fn dispose(&self, cache_name: &str, requester_id: i64) -> Result<()>;

    fn is_alive(&self) -> Result<bool>;
}

// == Remote HTTP Cache Client ==
/// HTTP implementation of [`CacheServiceNonLocal`].
///
/// Unusable until [`initialize`](Self::initialize) has supplied the
/// attributes; every operation fails with [`CacheError::Uninitialized`] before
/// that.
#[derive(Debug, Default)]
pub struct RemoteHttpCacheClient {
    dispatcher: OnceLock<RemoteHttpCacheDispatcher>,
}

impl RemoteHttpCacheClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a client that is already initialized.
    pub fn with_attributes(attributes: RemoteHttpCacheAttributes) -> Result<Self> {
        let client = Self::new();
        client.initialize(attributes)?;
        Ok(client)
    }

    /// Creates the dispatcher. A second call is ignored.
    pub fn initialize(&self, attributes: RemoteHttpCacheAttributes) -> Result<()> {
        if self.dispatcher.get().is_some() {
            warn!("Client for [{}] is already initialized", attributes.cache_name);
            return Ok(());
        }
        let dispatcher = RemoteHttpCacheDispatcher::new(attributes)?;
        info!("Created remote dispatcher for [{}]", dispatcher.attributes().url);
        // A racing initializer may win; either dispatcher is equivalent.
        let _ = self.dispatcher.set(dispatcher);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.dispatcher.get().is_some()
    }

    fn dispatcher(&self) -> Result<&RemoteHttpCacheDispatcher> {
        self.dispatcher.get().ok_or_else(|| {
            CacheError::Uninitialized("The remote HTTP client has not been initialized".to_string())
        })
    }

    /// Sends a request and unwraps the payload.
    ///
    /// A missing or undecodable reply is `Ok(None)`; a reply flagged as failed
    /// is an internal error that does not indicate a broken peer.
    fn send<K, V, T>(&self, request: RemoteCacheRequest<K, V>) -> Result<Option<T>>
    where
        K: CacheKey,
        V: CacheValue,
        T: DeserializeOwned,
    {
        let response = self.dispatcher()?.dispatch::<K, V, T>(&request)?;
        match response {
            None => {
                warn!(
                    "No usable reply to {} for [{}]",
                    request.request_type, request.cache_name
                );
                Ok(None)
            }
            Some(response) if response.success => Ok(response.payload),
            Some(response) => Err(CacheError::Internal(format!(
                "{} for [{}] failed on the peer: {}",
                request.request_type,
                request.cache_name,
                response.error_message.unwrap_or_default()
            ))),
        }
    }
}

impl<K: CacheKey, V: CacheValue> CacheServiceNonLocal<K, V> for RemoteHttpCacheClient {
    fn get(&self, cache_name: &str, key: &K, requester_id: i64) -> Result<Option<CacheElement<K, V>>> {
        let element: Option<CacheElement<K, V>> =
            self.send(RemoteCacheRequest::<K, V>::get(cache_name, key.clone(), requester_id))?;
        debug!("Get [{}] from [{}] found={}", key, cache_name, element.is_some());
        Ok(element)
    }

    fn get_multiple(
        &self,
        cache_name: &str,
        keys: &HashSet<K>,
        requester_id: i64,
    ) -> Result<HashMap<K, CacheElement<K, V>>> {
        let found: Option<HashMap<K, CacheElement<K, V>>> = self.send(RemoteCacheRequest::<K, V>::get_multiple(
            cache_name,
            keys.clone(),
            requester_id,
        ))?;
        Ok(found.unwrap_or_default())
    }

    fn get_matching(
        &self,
        cache_name: &str,
        pattern: &str,
        requester_id: i64,
    ) -> Result<HashMap<K, CacheElement<K, V>>> {
        let found: Option<HashMap<K, CacheElement<K, V>>> = self.send(RemoteCacheRequest::<K, V>::get_matching(
            cache_name,
            pattern,
            requester_id,
        ))?;
        Ok(found.unwrap_or_default())
    }

    fn get_key_set(&self, cache_name: &str, requester_id: i64) -> Result<HashSet<K>> {
        let keys: Option<HashSet<K>> =
            self.send(RemoteCacheRequest::<K, V>::get_key_set(cache_name, requester_id))?;
        Ok(keys.unwrap_or_default())
    }

    fn update(&self, element: CacheElement<K, V>, requester_id: i64) -> Result<()> {
        self.send::<K, V, String>(RemoteCacheRequest::update(element, requester_id))?;
        Ok(())
    }

    fn remove(&self, cache_name: &str, key: &K, requester_id: i64) -> Result<bool> {
        let removed = self.send::<K, V, bool>(RemoteCacheRequest::remove(
            cache_name,
            key.clone(),
            requester_id,
        ))?;
        Ok(removed.unwrap_or(false))
    }

    fn remove_all(&self, cache_name: &str, requester_id: i64) -> Result<()> {
        self.send::<K, V, String>(RemoteCacheRequest::remove_all(cache_name, requester_id))?;
        Ok(())
    }

    fn dispose(&self, cache_name: &str, requester_id: i64) -> Result<()> {
        self.send::<K, V, String>(RemoteCacheRequest::dispose(cache_name, requester_id))?;
        Ok(())
    }

    /// A missing reply counts as not alive.
    fn is_alive(&self) -> Result<bool> {
        let request = RemoteCacheRequest::<K, V>::alive_check(crate::models::DEFAULT_REQUESTER_ID);
        let response = self.dispatcher()?.dispatch::<K, V, String>(&request)?;
        Ok(response.map(|response| response.success).unwrap_or(false))
    }
}

// == Client Factory ==
/// Creates clients for the manager and for the monitor's recovery attempts.
pub trait RemoteHttpClientFactory<K: CacheKey, V: CacheValue>: Send + Sync {
    fn create(
        &self,
        attributes: &RemoteHttpCacheAttributes,
    ) -> Result<Arc<dyn CacheServiceNonLocal<K, V>>>;
}

/// Factory for [`RemoteHttpCacheClient`].
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpClientFactory;

impl<K: CacheKey, V: CacheValue> RemoteHttpClientFactory<K, V> for HttpClientFactory {
    fn create(
        &self,
        attributes: &RemoteHttpCacheAttributes,
    ) -> Result<Arc<dyn CacheServiceNonLocal<K, V>>> {
        Ok(Arc::new(RemoteHttpCacheClient::with_attributes(attributes.clone())?))
    }
}
