//! Report caching
//!
//! - [`local`]: the [`CacheStore`] boundary and its in-memory backend
//! - [`report`]: TTL report cache with canonical content-hashed keys

pub mod local;
pub mod report;

pub use local::{CacheStore, MemoryCacheStore, StoredEntry, MAX_TTL_SECONDS};
pub use report::{canonicalize, generate_cache_key, CacheConfig, CacheEntry, CacheStats, ReportCache};
