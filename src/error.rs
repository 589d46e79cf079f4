//! Error types for the cache access layer
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for cache access, remote dispatch and configuration.
#[derive(Error, Debug)]
pub enum CacheError {
    /// I/O failure or timeout talking to the remote peer
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed or unreadable payload
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Bad key, value or pattern supplied by the caller
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// `put_safe` on a key that is already present
    #[error("Object exists: {0}")]
    ObjectExists(String),

    /// Operation on a key or region that does not exist
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Missing or unparsable configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Remote client used before `initialize`
    #[error("Client not initialized: {0}")]
    Uninitialized(String),

    /// Region was disposed
    #[error("Cache disposed: {0}")]
    Disposed(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    /// Returns true when the error is evidence that the remote peer is broken.
    ///
    /// Serialization problems are not: a garbled reply still came from a live peer.
    pub fn triggers_failover(&self) -> bool {
        matches!(self, CacheError::Transport(_) | CacheError::Uninitialized(_))
    }
}

// == Conversions ==
impl From<reqwest::Error> for CacheError {
    fn from(err: reqwest::Error) -> Self {
        CacheError::Transport(err.to_string())
    }
}

impl From<bincode::Error> for CacheError {
    fn from(err: bincode::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

impl From<regex::Error> for CacheError {
    fn from(err: regex::Error) -> Self {
        CacheError::InvalidArgument(err.to_string())
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache access layer.
pub type Result<T> = std::result::Result<T, CacheError>;
