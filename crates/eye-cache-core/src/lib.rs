//! eye-cache-core: Store-level traits and types for the eye-client cache
//!
//! This crate defines the boundary between the cache coordination layer and
//! the key-value store underneath it: the store traits, the stored entry
//! record, write options and the pluggable serializer and metrics seams.

mod error;
mod traits;
mod types;

pub use error::{CacheError, Result};
pub use traits::*;
pub use types::*;
