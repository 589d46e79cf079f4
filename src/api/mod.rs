//! API Module
//!
//! HTTP handlers and routing for the remote cache peer.
//!
//! # Endpoints
//! - `POST /`, `POST /cache` - Binary wire requests from remote clients
//! - `GET /stats` - Per-region statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
