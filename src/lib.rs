//! Remote Cache - partitioned cache access backed by a resilient remote HTTP cache
//!
//! Application code talks to [`CacheAccess`], [`GroupCacheAccess`] or
//! [`PartitionedCacheAccess`]. Regions are either local in-memory stores or
//! [`remote::RemoteHttpCache`] instances that fail over to a queueing zombie
//! while the peer is unreachable and are restored by a background monitor.
//! The `api` module is the peer those clients talk to.

pub mod access;
pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod remote;
pub mod tasks;

pub use access::{CacheAccess, GroupCacheAccess, PartitionedCacheAccess, RegionProvider};
pub use api::{create_router, AppState};
pub use config::{MonitorConfig, PartitionConfig, RemoteHttpCacheAttributes, ServerConfig};
pub use error::{CacheError, Result};
pub use remote::RemoteHttpCacheManager;
pub use tasks::spawn_cleanup_task;
