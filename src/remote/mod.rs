//! Remote Module
//!
//! Client side of the remote HTTP cache: the binary codec, the HTTP
//! dispatcher, the typed client, the zombie failover stand-in, the per-region
//! failover wrapper, the recovery monitor and the manager that ties them
//! together.

mod cache;
mod client;
mod dispatcher;
mod manager;
mod monitor;
mod serializer;
mod zombie;

pub use cache::{CacheStatus, RemoteHttpCache};
pub use client::{
    CacheServiceNonLocal, HttpClientFactory, RemoteHttpCacheClient, RemoteHttpClientFactory,
};
pub use dispatcher::RemoteHttpCacheDispatcher;
pub use manager::RemoteHttpCacheManager;
pub use monitor::RemoteHttpCacheMonitor;
pub use serializer::StandardSerializer;
pub use zombie::{QueuedOperation, ZombieCacheServiceNonLocal};
