//! Core traits for store operations

mod backend;
mod metrics;
mod serializer;

#[cfg(feature = "tracing")]
mod tracing;

pub use backend::{CacheBackend, CacheStore, DependencyBackend};
pub use metrics::{CacheMetrics, CacheOperation, EvictionReason, NoopMetrics};
pub use serializer::{JsonSerializer, Serializer};

#[cfg(feature = "metrics")]
pub use metrics::MetricsCrateAdapter;

#[cfg(feature = "tracing")]
pub use self::tracing::TracingMetrics;
