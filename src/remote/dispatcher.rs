//! HTTP transport for wire requests.

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::Version;
use serde::de::DeserializeOwned;
use tracing::{debug, error};

use crate::cache::{CacheKey, CacheValue};
use crate::config::{HttpVersion, RemoteHttpCacheAttributes};
use crate::error::{CacheError, Result};
use crate::models::{RemoteCacheRequest, RemoteCacheResponse};
use crate::remote::StandardSerializer;

const OCTET_STREAM: &str = "application/octet-stream";

// == Dispatcher ==
/// POSTs serialized requests to the peer and decodes its replies.
///
/// Blocking: every call occupies the caller's thread for at most the
/// configured connect and read timeouts.
#[derive(Debug)]
pub struct RemoteHttpCacheDispatcher {
    attributes: RemoteHttpCacheAttributes,
    client: Client,
    serializer: StandardSerializer,
}

impl RemoteHttpCacheDispatcher {
    /// Builds the pooled HTTP client for `attributes`.
    ///
    /// Must not be called from inside an async runtime.
    pub fn new(attributes: RemoteHttpCacheAttributes) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(attributes.connection_timeout())
            .timeout(attributes.socket_timeout())
            .pool_max_idle_per_host(attributes.max_connections_per_host)
            .no_proxy()
            .build()?;
        debug!(
            "Created dispatcher for [{}] at [{}]",
            attributes.cache_name, attributes.url
        );
        Ok(Self {
            attributes,
            client,
            serializer: StandardSerializer,
        })
    }

    pub fn attributes(&self) -> &RemoteHttpCacheAttributes {
        &self.attributes
    }

    /// Query parameters mirroring the binary body, each enabled by its own flag.
    pub fn wire_parameters<K: CacheKey, V: CacheValue>(
        &self,
        request: &RemoteCacheRequest<K, V>,
    ) -> Vec<(&'static str, String)> {
        let mut params = Vec::with_capacity(3);
        if self.attributes.include_cache_name_as_parameter {
            params.push(("CacheName", request.cache_name.clone()));
        }
        if self.attributes.include_keys_and_patterns_as_parameter {
            if let Some(key) = request.key_parameter() {
                params.push(("Key", key));
            }
        }
        if self.attributes.include_request_type_as_parameter {
            params.push(("RequestType", request.request_type.to_string()));
        }
        params
    }

    /// Sends one request and decodes the reply envelope.
    ///
    /// Transport failures and non-2xx statuses are [`CacheError::Transport`].
    /// A body that cannot be decoded is logged and returned as `Ok(None)`.
    pub fn dispatch<K, V, T>(
        &self,
        request: &RemoteCacheRequest<K, V>,
    ) -> Result<Option<RemoteCacheResponse<T>>>
    where
        K: CacheKey,
        V: CacheValue,
        T: DeserializeOwned,
    {
        let body = self.serializer.serialize(request)?;
        let version = match self.attributes.http_version {
            HttpVersion::Http10 => Version::HTTP_10,
            HttpVersion::Http11 => Version::HTTP_11,
        };
        debug!(
            "Dispatching {} for [{}] ({} bytes) to [{}]",
            request.request_type,
            request.cache_name,
            body.len(),
            self.attributes.url
        );

        let response = self
            .client
            .post(&self.attributes.url)
            .version(version)
            .header(CONTENT_TYPE, OCTET_STREAM)
            .query(&self.wire_parameters(request))
            .body(body)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(CacheError::Transport(format!(
                "{} for [{}] returned HTTP {}",
                request.request_type, request.cache_name, status
            )));
        }

        let bytes = response.bytes()?;
        match self.serializer.deserialize::<RemoteCacheResponse<T>>(&bytes) {
            Ok(decoded) => Ok(Some(decoded)),
            Err(err) => {
                error!(
                    "Couldn't decode reply to {} for [{}]: {}",
                    request.request_type, request.cache_name, err
                );
                Ok(None)
            }
        }
    }
}
