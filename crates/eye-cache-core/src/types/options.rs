//! Write options

use std::time::Duration;

/// Options applied to a single store write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheOptions {
    /// Time-to-live; `None` never expires
    pub ttl: Option<Duration>,
}

impl CacheOptions {
    /// Options for an entry living `ttl`
    pub fn with_ttl(ttl: Duration) -> Self {
        Self { ttl: Some(ttl) }
    }
}

impl From<Duration> for CacheOptions {
    fn from(ttl: Duration) -> Self {
        Self::with_ttl(ttl)
    }
}
