//! eye-cache-storage: Cache stores for eye-client
//!
//! - [`MemoryBackend`]: in-process store, the default
//! - `RedisBackend`: shared store for several client processes (`redis` feature)

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "redis")]
pub mod redis;

#[cfg(feature = "memory")]
pub use memory::{MemoryBackend, MemoryConfig};

#[cfg(feature = "redis")]
pub use self::redis::{RedisBackend, RedisConfig};
