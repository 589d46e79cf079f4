//! Configuration Module
//!
//! Loads remote client, monitor, partition and server settings from property
//! maps, with process environment variables taking precedence.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use tracing::info;

use crate::error::{CacheError, Result};

/// Property heading for remote HTTP cache attributes.
pub const REMOTE_HTTP_CACHE_HEADING: &str = "RemoteHttpCache";

/// Property heading for monitor settings.
pub const MONITOR_HEADING: &str = "RemoteHttpCacheMonitor";

// == Property Lookup ==
/// Converts a property name such as `PartitionedCacheAccess.numberOfPartitions`
/// into its environment override `PARTITIONED_CACHE_ACCESS_NUMBER_OF_PARTITIONS`.
pub fn env_key_for(property_name: &str) -> String {
    let mut key = String::with_capacity(property_name.len() + 8);
    let mut prev_lower = false;
    for c in property_name.chars() {
        if c == '.' || c == '-' {
            key.push('_');
            prev_lower = false;
            continue;
        }
        if c.is_ascii_uppercase() && prev_lower {
            key.push('_');
        }
        prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        key.push(c.to_ascii_uppercase());
    }
    key
}

/// Looks a property up, preferring the process environment over the map.
pub fn lookup_property(props: &HashMap<String, String>, property_name: &str) -> Option<String> {
    let env_key = env_key_for(property_name);
    if let Ok(value) = env::var(&env_key) {
        info!(
            "Found environment override: name [{}] value [{}]",
            property_name, value
        );
        return Some(value);
    }
    props.get(property_name).cloned()
}

/// Like [`lookup_property`] but fails with a configuration error when missing.
pub fn required_property(props: &HashMap<String, String>, property_name: &str) -> Result<String> {
    lookup_property(props, property_name).ok_or_else(|| {
        CacheError::Configuration(format!(
            "Could not find required property [{}]",
            property_name
        ))
    })
}

fn parsed_property<T: std::str::FromStr>(
    props: &HashMap<String, String>,
    property_name: &str,
    default: T,
) -> Result<T> {
    match lookup_property(props, property_name) {
        Some(raw) => raw.trim().parse().map_err(|_| {
            CacheError::Configuration(format!(
                "Could not convert [{}] for [{}]",
                raw, property_name
            ))
        }),
        None => Ok(default),
    }
}

// == HTTP Version ==
/// HTTP protocol version used by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVersion {
    Http10,
    Http11,
}

impl std::str::FromStr for HttpVersion {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "1.0" => Ok(HttpVersion::Http10),
            "1.1" => Ok(HttpVersion::Http11),
            other => Err(CacheError::Configuration(format!(
                "Unsupported httpVersion [{}], expected \"1.0\" or \"1.1\"",
                other
            ))),
        }
    }
}

// == Remote HTTP Cache Attributes ==
/// Settings for one remote region and the client that talks to it.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteHttpCacheAttributes {
    /// Region name on the remote peer
    pub cache_name: String,
    /// Endpoint requests are POSTed to
    pub url: String,
    /// Upper bound on idle pooled connections per host
    pub max_connections_per_host: usize,
    /// Read timeout in milliseconds
    pub socket_timeout_millis: u64,
    /// Connect timeout in milliseconds
    pub connection_timeout_millis: u64,
    pub http_version: HttpVersion,
    pub include_cache_name_as_parameter: bool,
    pub include_keys_and_patterns_as_parameter: bool,
    pub include_request_type_as_parameter: bool,
    /// Bound on mutations buffered while the peer is unreachable
    pub zombie_queue_max_size: usize,
}

impl RemoteHttpCacheAttributes {
    /// Creates attributes for a region at `url` with default settings.
    pub fn new(cache_name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            cache_name: cache_name.into(),
            url: url.into(),
            ..Self::default()
        }
    }

    /// Loads attributes from `RemoteHttpCache.*` properties.
    ///
    /// # Properties
    /// - `url` (default: `http://localhost:8080/`)
    /// - `maxConnectionsPerHost` (default: 100)
    /// - `socketTimeoutMillis` (default: 3000)
    /// - `connectionTimeoutMillis` (default: 5000)
    /// - `httpVersion` (default: `1.1`)
    /// - `includeCacheNameAsParameter`, `includeKeysAndPatternsAsParameter`,
    ///   `includeRequestTypeasAsParameter` (default: true)
    /// - `zombieQueueMaxSize` (default: 1000)
    pub fn from_properties(props: &HashMap<String, String>) -> Result<Self> {
        let defaults = Self::default();
        let name = |option: &str| format!("{}.{}", REMOTE_HTTP_CACHE_HEADING, option);

        Ok(Self {
            cache_name: lookup_property(props, &name("cacheName")).unwrap_or(defaults.cache_name),
            url: lookup_property(props, &name("url")).unwrap_or(defaults.url),
            max_connections_per_host: parsed_property(
                props,
                &name("maxConnectionsPerHost"),
                defaults.max_connections_per_host,
            )?,
            socket_timeout_millis: parsed_property(
                props,
                &name("socketTimeoutMillis"),
                defaults.socket_timeout_millis,
            )?,
            connection_timeout_millis: parsed_property(
                props,
                &name("connectionTimeoutMillis"),
                defaults.connection_timeout_millis,
            )?,
            http_version: parsed_property(props, &name("httpVersion"), defaults.http_version)?,
            include_cache_name_as_parameter: parsed_property(
                props,
                &name("includeCacheNameAsParameter"),
                true,
            )?,
            include_keys_and_patterns_as_parameter: parsed_property(
                props,
                &name("includeKeysAndPatternsAsParameter"),
                true,
            )?,
            include_request_type_as_parameter: parsed_property(
                props,
                &name("includeRequestTypeasAsParameter"),
                true,
            )?,
            zombie_queue_max_size: parsed_property(
                props,
                &name("zombieQueueMaxSize"),
                defaults.zombie_queue_max_size,
            )?,
        })
    }

    /// Loads attributes from environment variables only.
    pub fn from_env() -> Result<Self> {
        Self::from_properties(&HashMap::new())
    }

    /// Returns a copy addressing another region on the same endpoint.
    pub fn for_region(&self, cache_name: impl Into<String>) -> Self {
        Self {
            cache_name: cache_name.into(),
            ..self.clone()
        }
    }

    pub fn socket_timeout(&self) -> Duration {
        Duration::from_millis(self.socket_timeout_millis)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_millis)
    }
}

impl Default for RemoteHttpCacheAttributes {
    fn default() -> Self {
        Self {
            cache_name: String::new(),
            url: "http://localhost:8080/".to_string(),
            max_connections_per_host: 100,
            socket_timeout_millis: 3000,
            connection_timeout_millis: 5000,
            http_version: HttpVersion::Http11,
            include_cache_name_as_parameter: true,
            include_keys_and_patterns_as_parameter: true,
            include_request_type_as_parameter: true,
            zombie_queue_max_size: 1000,
        }
    }
}

// == Partition Configuration ==
/// Sharding settings for a partitioned region, read once at initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionConfig {
    pub number_of_partitions: usize,
    pub partition_region_name_prefix: String,
}

impl PartitionConfig {
    /// Loads `<heading>.numberOfPartitions` and `<heading>.partitionRegionNamePrefix`.
    ///
    /// Both are required and the partition count must be at least one.
    pub fn from_properties(props: &HashMap<String, String>, heading: &str) -> Result<Self> {
        let count_name = format!("{}.numberOfPartitions", heading);
        let raw_count = required_property(props, &count_name)?;
        let number_of_partitions: usize = raw_count.trim().parse().map_err(|_| {
            CacheError::Configuration(format!(
                "Could not convert [{}] for [{}]",
                raw_count, count_name
            ))
        })?;
        if number_of_partitions == 0 {
            return Err(CacheError::Configuration(format!(
                "[{}] must be at least 1",
                count_name
            )));
        }

        let partition_region_name_prefix =
            required_property(props, &format!("{}.partitionRegionNamePrefix", heading))?;

        Ok(Self {
            number_of_partitions,
            partition_region_name_prefix,
        })
    }

    /// Region name of partition `index`.
    pub fn region_name(&self, index: usize) -> String {
        format!("{}_{}", self.partition_region_name_prefix, index)
    }
}

// == Monitor Configuration ==
/// Operating mode of the recovery monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorMode {
    /// Sleep until a cache reports an error
    Error,
    /// Re-scan every idle period regardless of notifications
    Time,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    pub idle_period: Duration,
    pub mode: MonitorMode,
}

impl MonitorConfig {
    /// Loads `RemoteHttpCacheMonitor.idlePeriod` (millis) and
    /// `RemoteHttpCacheMonitor.mode` (`error` | `time`).
    pub fn from_properties(props: &HashMap<String, String>) -> Result<Self> {
        let defaults = Self::default();
        let idle_millis = parsed_property(
            props,
            &format!("{}.idlePeriod", MONITOR_HEADING),
            defaults.idle_period.as_millis() as u64,
        )?;
        let mode = match lookup_property(props, &format!("{}.mode", MONITOR_HEADING)) {
            None => defaults.mode,
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "error" => MonitorMode::Error,
                "time" => MonitorMode::Time,
                other => {
                    return Err(CacheError::Configuration(format!(
                        "Unknown monitor mode [{}]",
                        other
                    )))
                }
            },
        };
        Ok(Self {
            idle_period: Duration::from_millis(idle_millis),
            mode,
        })
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            idle_period: Duration::from_secs(3),
            mode: MonitorMode::Error,
        }
    }
}

// == Server Configuration ==
/// Remote cache peer configuration.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP server port
    pub server_port: u16,
    /// Maximum number of elements each region can hold
    pub max_objects: usize,
    /// Background expiry sweep interval in seconds
    pub cleanup_interval: u64,
}

impl ServerConfig {
    /// Creates a new ServerConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 8080)
    /// - `MAX_OBJECTS` - Maximum elements per region (default: 1000)
    /// - `CLEANUP_INTERVAL` - Expiry sweep frequency in seconds (default: 1)
    pub fn from_env() -> Self {
        Self {
            server_port: env::var("SERVER_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            max_objects: env::var("MAX_OBJECTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1000),
            cleanup_interval: env::var("CLEANUP_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_port: 8080,
            max_objects: 1000,
            cleanup_interval: 1,
        }
    }
}
