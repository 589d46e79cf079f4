//! Integration Tests for the Remote HTTP Cache
//!
//! Runs a real peer on a loopback port and drives it through the blocking
//! client stack: manager, failover cache and the access facades.

use std::collections::{HashMap, HashSet};
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;
use std::thread::sleep;
use std::time::{Duration, Instant};

use axum::{routing::post, Router};
use remote_cache::access::{GroupAttrName, RegionProvider};
use remote_cache::cache::{
    BackingStore, CacheElement, CacheKey, CacheValue, ElementAttributes, LocalCacheManager,
};
use remote_cache::config::MonitorMode;
use remote_cache::models::RemoteCacheRequest;
use remote_cache::remote::{
    CacheServiceNonLocal, CacheStatus, HttpClientFactory, RemoteHttpCache,
    RemoteHttpCacheDispatcher, RemoteHttpClientFactory,
};
use remote_cache::{
    create_router, AppState, CacheAccess, GroupCacheAccess, MonitorConfig,
    PartitionedCacheAccess, RemoteHttpCacheAttributes, RemoteHttpCacheManager,
};
use tokio::runtime::Runtime;

// == Helper Functions ==

/// A peer served on its own runtime. Dropping it stops the server.
struct Peer<K: CacheKey, V: CacheValue> {
    state: AppState<K, V>,
    url: String,
    _runtime: Runtime,
}

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

/// Serves `app` on `addr`; returns the runtime and the `/cache` URL.
fn serve(app: Router, addr: SocketAddr) -> (Runtime, String) {
    let runtime = runtime();
    let listener = runtime
        .block_on(tokio::net::TcpListener::bind(addr))
        .unwrap();
    let addr = listener.local_addr().unwrap();
    runtime.spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (runtime, format!("http://{}/cache", addr))
}

fn start_peer_on<K: CacheKey, V: CacheValue>(addr: SocketAddr) -> Peer<K, V> {
    let state: AppState<K, V> = AppState::new(LocalCacheManager::new(100));
    let (runtime, url) = serve(create_router(state.clone()), addr);

    Peer {
        state,
        url,
        _runtime: runtime,
    }
}

fn start_peer<K: CacheKey, V: CacheValue>() -> Peer<K, V> {
    start_peer_on(SocketAddr::from(([127, 0, 0, 1], 0)))
}

/// An address nothing listens on (until a peer is started on it).
fn free_addr() -> SocketAddr {
    let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

fn manager<K: CacheKey, V: CacheValue>(url: &str) -> Arc<RemoteHttpCacheManager<K, V>> {
    let mut attributes = RemoteHttpCacheAttributes::new("", url);
    attributes.connection_timeout_millis = 500;
    attributes.socket_timeout_millis = 2000;
    let factory: Arc<dyn RemoteHttpClientFactory<K, V>> = Arc::new(HttpClientFactory);
    let monitor = MonitorConfig {
        idle_period: Duration::from_millis(100),
        mode: MonitorMode::Error,
    };
    Arc::new(RemoteHttpCacheManager::new(attributes, factory, monitor).unwrap())
}

fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(20));
    }
    condition()
}

// == Region Operations ==

#[test]
fn test_put_get_remove_through_peer() {
    let peer = start_peer::<String, String>();
    let manager = manager::<String, String>(&peer.url);
    let access = manager.region("users").unwrap();

    access.put("user:1".to_string(), "alice".to_string()).unwrap();
    access.put("user:2".to_string(), "bob".to_string()).unwrap();
    access.put("order:1".to_string(), "book".to_string()).unwrap();

    assert_eq!(access.get(&"user:1".to_string()).as_deref(), Some("alice"));
    assert_eq!(access.get(&"missing".to_string()), None);

    let matched = access.get_matching("user:.*").unwrap();
    assert_eq!(matched.len(), 2);
    assert_eq!(matched.get("user:2").map(String::as_str), Some("bob"));

    let keys: HashSet<String> = ["user:1".to_string(), "order:1".to_string(), "nope".to_string()]
        .into_iter()
        .collect();
    assert_eq!(access.get_cache_elements(&keys).len(), 2);

    access.remove(&"user:1".to_string()).unwrap();
    assert_eq!(access.get(&"user:1".to_string()), None);

    // Everything landed in the peer's own region of the same name
    let region = peer.state.manager.existing("users").unwrap();
    assert_eq!(region.len(), 2);
    assert!(peer.state.service_calls() >= 7);

    access.clear().unwrap();
    assert!(region.is_empty());
}

#[test]
fn test_put_safe_sees_remote_element() {
    let peer = start_peer::<String, String>();
    let manager = manager::<String, String>(&peer.url);
    let access = manager.region("region").unwrap();

    access.put_safe("k".to_string(), "first".to_string()).unwrap();
    let again = access.put_safe("k".to_string(), "second".to_string());

    assert!(again.is_err());
    assert_eq!(access.get(&"k".to_string()).as_deref(), Some("first"));
}

#[test]
fn test_bad_pattern_does_not_fail_over() {
    let peer = start_peer::<String, String>();
    let manager = manager::<String, String>(&peer.url);
    let cache = manager.get_cache("region").unwrap();

    assert!(cache.get_matching("(unclosed").is_err());
    assert_eq!(cache.status(), CacheStatus::Alive);
}

#[test]
fn test_regions_on_the_root_path() {
    let peer = start_peer::<String, u64>();
    let root_url = peer.url.trim_end_matches("cache").to_string();
    let manager = manager::<String, u64>(&root_url);

    let counters = manager.region("counters").unwrap();
    counters.put("visits".to_string(), 41).unwrap();
    counters.put("visits".to_string(), 42).unwrap();

    assert_eq!(counters.get(&"visits".to_string()), Some(42));
    assert_eq!(manager.cache_names(), vec!["counters".to_string()]);
}

#[test]
fn test_release_disposes_and_recreates() {
    let peer = start_peer::<String, String>();
    let manager = manager::<String, String>(&peer.url);

    let first = manager.get_cache("region").unwrap();
    first
        .update(CacheElement::new(
            "region",
            "k".to_string(),
            "v".to_string(),
            ElementAttributes::new(),
        ))
        .unwrap();

    assert!(manager.release("region").unwrap());
    assert_eq!(first.status(), CacheStatus::Disposed);
    assert!(first.get(&"k".to_string()).is_err());

    // DISPOSE leaves the peer's data in place
    let second = manager.get_cache("region").unwrap();
    assert_eq!(second.status(), CacheStatus::Alive);
    assert!(second.get(&"k".to_string()).unwrap().is_some());
}

// == Group Access ==

#[test]
fn test_group_invalidation_through_peer() {
    let peer = start_peer::<GroupAttrName<String>, String>();
    let manager = manager::<GroupAttrName<String>, String>(&peer.url);
    let groups = GroupCacheAccess::from_access(manager.region("sessions").unwrap());

    groups.put_in_group("a".to_string(), "g1", "1".to_string()).unwrap();
    groups.put_in_group("b".to_string(), "g1", "2".to_string()).unwrap();
    groups.put_in_group("a".to_string(), "g2", "3".to_string()).unwrap();

    let expected: HashSet<String> = ["a".to_string(), "b".to_string()].into_iter().collect();
    assert_eq!(groups.get_group_keys("g1"), expected);
    assert_eq!(groups.get_group_names().len(), 2);

    groups.invalidate_group("g1").unwrap();

    assert!(groups.get_group_keys("g1").is_empty());
    assert_eq!(groups.get_from_group(&"a".to_string(), "g2").as_deref(), Some("3"));
}

// == Partitioned Access ==

#[test]
fn test_partitioned_access_over_remote_regions() {
    let peer = start_peer::<String, String>();
    let manager = manager::<String, String>(&peer.url);
    let provider: Arc<dyn RegionProvider<String, String>> = manager.clone();

    let properties: HashMap<String, String> = [
        ("PartitionedCacheAccess.numberOfPartitions", "3"),
        ("PartitionedCacheAccess.partitionRegionNamePrefix", "shard"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    let partitioned = PartitionedCacheAccess::new(provider, properties);

    for i in 0..30 {
        partitioned.put(i.to_string(), format!("value-{}", i)).unwrap();
    }

    assert_eq!(partitioned.get(&"7".to_string()).as_deref(), Some("value-7"));
    assert_eq!(partitioned.get_matching("1.").unwrap().len(), 10);

    // Numeric keys land on key % partitions
    for shard in 0..3 {
        let region = peer.state.manager.existing(&format!("shard_{}", shard)).unwrap();
        assert_eq!(region.len(), 10);
        assert!(region.get(&(shard as i64 + 3).to_string()).unwrap().is_some());
    }

    partitioned.clear().unwrap();
    assert!(partitioned.get(&"7".to_string()).is_none());
}

// == Undecodable Replies ==

#[test]
fn test_undecodable_reply_is_empty_not_a_failover() {
    // 0xff is not a valid bool, so no reply envelope decodes from this body
    let garbage = Router::new().route("/cache", post(|| async { vec![0xffu8, 0x13, 0x37, 0x00, 0x42] }));
    let (_runtime, url) = serve(garbage, SocketAddr::from(([127, 0, 0, 1], 0)));
    let attributes = RemoteHttpCacheAttributes::new("region", url.as_str());

    let dispatcher = RemoteHttpCacheDispatcher::new(attributes.clone()).unwrap();
    let request: RemoteCacheRequest<String, String> =
        RemoteCacheRequest::get("region", "k".to_string(), 0);
    let reply = dispatcher.dispatch::<String, String, CacheElement<String, String>>(&request);
    assert!(matches!(reply, Ok(None)));

    let factory: Arc<dyn RemoteHttpClientFactory<String, String>> = Arc::new(HttpClientFactory);
    let client = factory.create(&attributes).unwrap();
    assert!(matches!(client.get("region", &"k".to_string(), 0), Ok(None)));
    assert!(!client.is_alive().unwrap());

    let cache = RemoteHttpCache::new(attributes, client, None);
    assert!(cache.get(&"k".to_string()).unwrap().is_none());
    cache
        .update(CacheElement::new(
            "region",
            "k".to_string(),
            "v".to_string(),
            ElementAttributes::new(),
        ))
        .unwrap();
    assert!(cache.get_matching(".*").unwrap().is_empty());

    assert_eq!(cache.status(), CacheStatus::Alive);
    assert_eq!(cache.queued_operations(), 0);
}

// == Failover and Recovery ==

#[test]
fn test_failover_queues_and_monitor_recovers() {
    let addr = free_addr();
    let url = format!("http://{}/cache", addr);
    let manager = manager::<String, String>(&url);
    let cache = manager.get_cache("region").unwrap();
    let access = CacheAccess::new(cache.clone() as Arc<dyn BackingStore<String, String>>);

    // No peer yet: the write is buffered and reads come back empty
    access.put("k".to_string(), "v".to_string()).unwrap();
    assert_eq!(cache.status(), CacheStatus::Error);
    assert_eq!(cache.queued_operations(), 1);
    assert_eq!(access.get(&"k".to_string()), None);
    assert!(access.get_matching(".*").unwrap().is_empty());

    access.put("k2".to_string(), "v2".to_string()).unwrap();
    assert_eq!(cache.queued_operations(), 2);

    let peer = start_peer_on::<String, String>(addr);

    assert!(
        wait_until(Duration::from_secs(10), || cache.status() == CacheStatus::Alive),
        "monitor should restore the cache once the peer is up"
    );
    assert_eq!(cache.queued_operations(), 0);
    assert!(manager.monitor().alive_checks() >= 1);

    // Buffered writes were replayed in order
    assert_eq!(access.get(&"k".to_string()).as_deref(), Some("v"));
    assert_eq!(access.get(&"k2".to_string()).as_deref(), Some("v2"));
    assert_eq!(peer.state.manager.existing("region").unwrap().len(), 2);
}

#[test]
fn test_close_stops_serving() {
    let peer = start_peer::<String, String>();
    let manager = manager::<String, String>(&peer.url);
    let cache = manager.get_cache("region").unwrap();

    manager.close();

    assert_eq!(cache.status(), CacheStatus::Disposed);
    assert!(manager.get_cache("region").is_err());
}
