//! Core types for store operations

mod entry;
mod options;
mod stats;

pub use entry::StoredEntry;
pub use options::CacheOptions;
pub use stats::CacheStats;
