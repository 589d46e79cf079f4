//! Response bodies
//!
//! The binary wire envelope returned by the remote peer, plus the JSON bodies
//! of its `/health` and `/stats` endpoints.

use serde::{Deserialize, Serialize};

use crate::cache::CacheStats;

/// Reply to one [`RemoteCacheRequest`](super::RemoteCacheRequest).
///
/// The payload type depends on the request: an element for GET, a map for
/// GET_MULTIPLE and GET_MATCHING, a key set for GET_KEYSET and a status string
/// otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCacheResponse<T> {
    pub success: bool,
    pub error_message: Option<String>,
    pub payload: Option<T>,
}

impl<T> RemoteCacheResponse<T> {
    pub fn ok(payload: T) -> Self {
        Self {
            success: true,
            error_message: None,
            payload: Some(payload),
        }
    }

    /// A successful reply whose payload may be absent, e.g. a GET miss.
    pub fn found(payload: Option<T>) -> Self {
        Self {
            success: true,
            error_message: None,
            payload,
        }
    }

    /// A failed reply. Carries no payload, so it decodes as any `T`.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: Some(message.into()),
            payload: None,
        }
    }
}

/// Statistics of one region (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct RegionStatsResponse {
    pub cache_name: String,
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
    /// Number of evictions
    pub evictions: u64,
    pub expirations: u64,
    /// Current number of entries in the region
    pub total_entries: usize,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl RegionStatsResponse {
    pub fn new(cache_name: impl Into<String>, stats: &CacheStats) -> Self {
        Self {
            cache_name: cache_name.into(),
            hits: stats.hits,
            misses: stats.misses,
            evictions: stats.evictions,
            expirations: stats.expirations,
            total_entries: stats.total_entries,
            hit_rate: stats.hit_rate(),
        }
    }
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Wire requests served since startup
    pub service_calls: u64,
    pub regions: Vec<RegionStatsResponse>,
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
