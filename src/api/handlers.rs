//! API Handlers
//!
//! The remote cache peer: decodes wire requests, runs them against the local
//! regions and encodes the reply. Also serves the JSON monitoring endpoints.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::cache::{BackingStore, CacheKey, CacheValue, LocalCacheManager};
use crate::config::ServerConfig;
use crate::error::{CacheError, Result};
use crate::models::{
    HealthResponse, RegionStatsResponse, RemoteCacheRequest, RemoteCacheResponse,
    RemoteRequestType, StatsResponse,
};
use crate::remote::StandardSerializer;

/// Service calls between two `serviceCalls` log lines.
const LOG_INTERVAL: u64 = 100;

/// Status payload of replies that carry no data.
const STATUS_OK: &str = "OK";

/// Application state shared across all handlers.
pub struct AppState<K: CacheKey, V: CacheValue> {
    /// Regions served by this peer
    pub manager: Arc<LocalCacheManager<K, V>>,
    service_calls: Arc<AtomicU64>,
}

impl<K: CacheKey, V: CacheValue> Clone for AppState<K, V> {
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
            service_calls: Arc::clone(&self.service_calls),
        }
    }
}

impl<K: CacheKey, V: CacheValue> AppState<K, V> {
    pub fn new(manager: LocalCacheManager<K, V>) -> Self {
        Self {
            manager: Arc::new(manager),
            service_calls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Creates a new AppState from configuration.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(LocalCacheManager::new(config.max_objects))
    }

    pub fn service_calls(&self) -> u64 {
        self.service_calls.load(Ordering::Relaxed)
    }

    fn record_service_call(&self) {
        let calls = self.service_calls.fetch_add(1, Ordering::Relaxed) + 1;
        if calls % LOG_INTERVAL == 0 {
            info!("serviceCalls = {}", calls);
        }
    }
}

/// Encodes a reply envelope as an octet-stream response.
fn respond<T: Serialize>(reply: &RemoteCacheResponse<T>) -> Response {
    match StandardSerializer.serialize(reply) {
        Ok(bytes) => ([(CONTENT_TYPE, "application/octet-stream")], bytes).into_response(),
        Err(err) => {
            error!("Problem encoding reply: {}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

fn respond_failure(message: String) -> Response {
    respond(&RemoteCacheResponse::<String>::failure(message))
}

/// Handler for POST / and POST /cache
///
/// Every decoding or processing problem is answered with `success = false`
/// rather than an HTTP error status, so clients never mistake it for a
/// broken peer.
pub async fn cache_service_handler<K: CacheKey, V: CacheValue>(
    State(state): State<AppState<K, V>>,
    body: Bytes,
) -> Response {
    state.record_service_call();

    let request: RemoteCacheRequest<K, V> = match StandardSerializer.deserialize(&body) {
        Ok(request) => request,
        Err(err) => {
            error!("Could not decode a RemoteCacheRequest: {}", err);
            return respond_failure(format!("Could not decode request: {}", err));
        }
    };
    debug!(
        "Servicing {} for [{}] from requester {}",
        request.request_type, request.cache_name, request.requester_id
    );

    if let Some(message) = request.validate() {
        warn!("Rejecting request: {}", message);
        return respond_failure(message);
    }

    let request_type = request.request_type;
    match process_request(&state.manager, request) {
        Ok(response) => response,
        Err(err) => {
            error!("Problem processing {}: {}", request_type, err);
            respond_failure(err.to_string())
        }
    }
}

/// Runs one decoded request against the named region.
fn process_request<K: CacheKey, V: CacheValue>(
    manager: &LocalCacheManager<K, V>,
    request: RemoteCacheRequest<K, V>,
) -> Result<Response> {
    let RemoteCacheRequest {
        request_type,
        cache_name,
        key,
        key_set,
        pattern,
        cache_element,
        ..
    } = request;
    let missing = || {
        CacheError::InvalidArgument(format!("{} request is missing its key field", request_type))
    };

    let response = match request_type {
        RemoteRequestType::Get => {
            let key = key.ok_or_else(missing)?;
            let element = manager.get_cache(&cache_name).get(&key)?;
            respond(&RemoteCacheResponse::found(element))
        }
        RemoteRequestType::GetMultiple => {
            let keys = key_set.ok_or_else(missing)?;
            let found = manager.get_cache(&cache_name).get_multiple(&keys)?;
            respond(&RemoteCacheResponse::ok(found))
        }
        RemoteRequestType::GetMatching => {
            let pattern = pattern.ok_or_else(missing)?;
            let found = manager.get_cache(&cache_name).get_matching(&pattern)?;
            respond(&RemoteCacheResponse::ok(found))
        }
        RemoteRequestType::GetKeySet => {
            let keys = manager.get_cache(&cache_name).get_key_set()?;
            respond(&RemoteCacheResponse::ok(keys))
        }
        RemoteRequestType::Update => {
            let element = cache_element.ok_or_else(missing)?;
            manager.get_cache(&cache_name).update(element)?;
            respond(&RemoteCacheResponse::ok(STATUS_OK.to_string()))
        }
        RemoteRequestType::Remove => {
            let key = key.ok_or_else(missing)?;
            let removed = manager.get_cache(&cache_name).remove(&key)?;
            respond(&RemoteCacheResponse::ok(removed))
        }
        RemoteRequestType::RemoveAll => {
            manager.get_cache(&cache_name).remove_all()?;
            respond(&RemoteCacheResponse::ok(STATUS_OK.to_string()))
        }
        RemoteRequestType::AliveCheck | RemoteRequestType::Dispose => {
            respond(&RemoteCacheResponse::ok(STATUS_OK.to_string()))
        }
    };
    Ok(response)
}

/// Handler for GET /stats
///
/// Returns per-region statistics and the service call count.
pub async fn stats_handler<K: CacheKey, V: CacheValue>(
    State(state): State<AppState<K, V>>,
) -> Json<StatsResponse> {
    let regions = state
        .manager
        .region_names()
        .into_iter()
        .filter_map(|name| {
            let region = state.manager.existing(&name)?;
            Some(RegionStatsResponse::new(name, &region.stats()))
        })
        .collect();

    Json(StatsResponse {
        service_calls: state.service_calls(),
        regions,
    })
}

/// Handler for GET /health
///
/// Returns health status of the server.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
