//! eye-client: Client for the Eye visitor tracking service
//!
//! # Features
//!
//! - **Sessions, activities, users and tags** over the Eye HTTP API
//! - **Read-through cache** with alias keys (user by email, keycloak id or session)
//! - **Dependency graph-based invalidation** after successful writes
//! - **Pluggable stores** (in-memory, Redis) and metrics
//! - **Optional single-flight** for concurrent misses
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use eye_client::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::new("https://eye.example.com", "token");
//!     let client = EyeClient::new(config)?.with_cache(MemoryBackend::default());
//!
//!     let session = client.create_session(&SessionDefinition::new("203.0.113.7")).await?;
//!     client.identify_session(session.id.clone(), 42u64).await?;
//!
//!     // Fetched once, then served from the cache under every alias
//!     let user = client.get_user(&UserFilter::by_session(session.id)).await?;
//!     println!("{:?}", user.email);
//!
//!     Ok(())
//! }
//! ```

mod client;
mod config;
pub mod coordinator;
mod error;
pub mod gateway;
pub mod keys;
pub mod model;
mod wire;

pub use client::EyeClient;
pub use config::ClientConfig;
pub use coordinator::{CacheCoordinator, CoordinatorConfig, Mutation, Placement};
pub use error::{EyeError, Result};
pub use gateway::{Gateway, HttpGateway};
pub use keys::{CacheKey, KeyKind};
pub use model::*;

// Re-export the store layer
pub use eye_cache_core::{
    CacheBackend, CacheError, CacheMetrics, CacheOperation, CacheStats, CacheStore,
    DependencyBackend, EvictionReason, JsonSerializer, NoopMetrics, Serializer,
};

#[cfg(feature = "tracing-metrics")]
pub use eye_cache_core::TracingMetrics;

#[cfg(feature = "metrics")]
pub use eye_cache_core::MetricsCrateAdapter;

pub use eye_cache_storage::{MemoryBackend, MemoryConfig};

#[cfg(feature = "redis")]
pub use eye_cache_storage::{RedisBackend, RedisConfig};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Activity, ActivityDefinition, ActivityFilter, CacheCoordinator, ClientConfig,
        CoordinatorConfig, EntityId, EyeClient, EyeError, MemoryBackend, MemoryConfig, Result,
        Session, SessionDefinition, User, UserDefinition, UserFilter,
    };

    #[cfg(feature = "redis")]
    pub use crate::{RedisBackend, RedisConfig};
}

#[cfg(test)]
mod tests;
