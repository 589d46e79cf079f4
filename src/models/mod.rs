//! Request and Response models
//!
//! The binary wire envelope exchanged between the remote client and the
//! cache peer, and the JSON bodies of the peer's monitoring endpoints.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::{RemoteCacheRequest, RemoteRequestType, DEFAULT_REQUESTER_ID};
pub use responses::{HealthResponse, RegionStatsResponse, RemoteCacheResponse, StatsResponse};
