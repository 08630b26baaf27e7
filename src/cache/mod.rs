//! Cache Module
//!
//! Tag-aware, TTL-aware cache strategies sharing one contract.

mod entry;
mod factory;
mod memory;
mod pattern;
mod stats;
mod strategy;

#[cfg(feature = "redis")]
mod redis_store;
#[cfg(feature = "sqlite")]
mod sqlite_store;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use entry::{current_timestamp_ms, CacheEntry};
pub use factory::create_strategy;
pub use memory::MemoryStrategy;
pub use pattern::GlobPattern;
pub use stats::CacheStats;
pub use strategy::{CacheStrategy, CacheStrategyExt, GetOptions, SetOptions};

#[cfg(feature = "redis")]
pub use redis_store::{resolve_redis_url, RedisStrategy, DEFAULT_REDIS_URL};
#[cfg(feature = "sqlite")]
pub use sqlite_store::{resolve_sqlite_path, SqliteStrategy, DEFAULT_SQLITE_PATH};
