//! API Routes
//!
//! Configures the Axum router of the remote cache peer.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{cache_service_handler, health_handler, stats_handler, AppState};
use crate::cache::{CacheKey, CacheValue};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `POST /` and `POST /cache` - Binary wire requests
/// - `GET /stats` - Per-region statistics
/// - `GET /health` - Health check endpoint
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests for debugging
pub fn create_router<K: CacheKey, V: CacheValue>(state: AppState<K, V>) -> Router {
    // Configure CORS middleware
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", post(cache_service_handler::<K, V>))
        .route("/cache", post(cache_service_handler::<K, V>))
        .route("/stats", get(stats_handler::<K, V>))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
