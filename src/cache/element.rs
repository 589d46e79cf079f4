//! Cache Element Module
//!
//! Defines the stored element and its per-element expiry attributes.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// == Element Attributes ==
/// Per-element policy metadata.
///
/// An element with neither `max_life` nor `max_idle` is eternal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementAttributes {
    /// Maximum lifetime in seconds from creation, None = unbounded
    pub max_life: Option<u64>,
    /// Maximum idle time in seconds since last access, None = unbounded
    pub max_idle: Option<u64>,
    /// Caller supplied size hint
    pub size: usize,
    /// Creation timestamp (Unix milliseconds)
    pub create_time: u64,
    /// Last access timestamp (Unix milliseconds)
    pub last_access_time: u64,
}

impl ElementAttributes {
    // == Constructor ==
    /// Creates eternal attributes stamped with the current time.
    pub fn new() -> Self {
        let now = current_timestamp_ms();
        Self {
            max_life: None,
            max_idle: None,
            size: 0,
            create_time: now,
            last_access_time: now,
        }
    }

    pub fn with_max_life(mut self, seconds: u64) -> Self {
        self.max_life = Some(seconds);
        self
    }

    pub fn with_max_idle(mut self, seconds: u64) -> Self {
        self.max_idle = Some(seconds);
        self
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn is_eternal(&self) -> bool {
        self.max_life.is_none() && self.max_idle.is_none()
    }

    // == Fresh Copy ==
    /// Copies these attributes (typically a region's defaults) for a new
    /// element, restamping creation and access times.
    pub fn fresh_copy(&self) -> Self {
        let now = current_timestamp_ms();
        Self {
            create_time: now,
            last_access_time: now,
            ..self.clone()
        }
    }

    // == Touch ==
    /// Records an access, extending an idle deadline.
    pub fn touch(&mut self) {
        self.last_access_time = current_timestamp_ms();
    }

    // == Is Expired ==
    /// Checks if the element has outlived its max life or max idle time.
    ///
    /// Boundary condition: an element is expired once the current time is
    /// greater than or equal to its deadline.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp_ms())
    }

    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        let life_over = self
            .max_life
            .map(|secs| now_ms >= deadline_ms(self.create_time, secs))
            .unwrap_or(false);
        let idle_over = self
            .max_idle
            .map(|secs| now_ms >= deadline_ms(self.last_access_time, secs))
            .unwrap_or(false);
        life_over || idle_over
    }

    // == Time To Live ==
    /// Returns seconds until max life elapses, or None for no max life.
    ///
    /// # Returns
    /// - `Some(0)` if the max life has elapsed
    /// - `Some(remaining_seconds)` otherwise
    pub fn time_to_live_seconds(&self) -> Option<u64> {
        self.max_life.map(|secs| {
            let expires = deadline_ms(self.create_time, secs);
            let now = current_timestamp_ms();
            if expires > now {
                (expires - now) / 1000
            } else {
                0
            }
        })
    }
}

/// `start_ms + secs`, clamped at `u64::MAX` so huge limits mean "never".
fn deadline_ms(start_ms: u64, secs: u64) -> u64 {
    start_ms.saturating_add(secs.saturating_mul(1000))
}

impl Default for ElementAttributes {
    fn default() -> Self {
        Self::new()
    }
}

// == Cache Element ==
/// A value stored under a key in a named region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheElement<K, V> {
    pub cache_name: String,
    pub key: K,
    pub value: V,
    pub attributes: ElementAttributes,
}

impl<K, V> CacheElement<K, V> {
    pub fn new(cache_name: impl Into<String>, key: K, value: V, attributes: ElementAttributes) -> Self {
        Self {
            cache_name: cache_name.into(),
            key,
            value,
            attributes,
        }
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn test_default_attributes_are_eternal() {
        let attrs = ElementAttributes::new();
        assert!(attrs.is_eternal());
        assert!(!attrs.is_expired());
        assert!(attrs.time_to_live_seconds().is_none());
    }

    #[test]
    fn test_max_life_expiration() {
        let attrs = ElementAttributes::new().with_max_life(1);
        assert!(!attrs.is_expired());

        sleep(Duration::from_millis(1100));

        assert!(attrs.is_expired());
        assert_eq!(attrs.time_to_live_seconds(), Some(0));
    }

    #[test]
    fn test_max_idle_reset_by_touch() {
        let mut attrs = ElementAttributes::new().with_max_idle(10);
        let later = attrs.last_access_time + 9_000;
        assert!(!attrs.is_expired_at(later));
        assert!(attrs.is_expired_at(attrs.last_access_time + 10_000));

        attrs.last_access_time = 0;
        assert!(attrs.is_expired());
        attrs.touch();
        assert!(!attrs.is_expired());
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let now = current_timestamp_ms();
        let attrs = ElementAttributes {
            max_life: Some(0),
            max_idle: None,
            size: 0,
            create_time: now,
            last_access_time: now,
        };

        assert!(attrs.is_expired(), "Element should be expired at boundary");
    }

    #[test]
    fn test_huge_limits_never_expire() {
        let attrs = ElementAttributes::new()
            .with_max_life(u64::MAX)
            .with_max_idle(u64::MAX / 100);

        assert!(!attrs.is_expired());
        assert!(!attrs.is_expired_at(u64::MAX - 1));
        assert!(attrs.time_to_live_seconds().unwrap() > 1_000_000_000);
    }

    #[test]
    fn test_fresh_copy_does_not_alias() {
        let mut defaults = ElementAttributes::new().with_max_life(60);
        defaults.create_time = 1;
        let copy = defaults.fresh_copy();

        defaults.max_life = Some(5);

        assert_eq!(copy.max_life, Some(60));
        assert!(copy.create_time > 1);
    }
}
