//! Tagged Cache - tag-aware, TTL-aware cache strategies
//!
//! One async contract ([`CacheStrategy`]) over in-memory, Redis and SQLite
//! backends, with tag-based group invalidation and lazy expiry.

pub mod cache;
pub mod config;
pub mod error;
pub mod tasks;

pub use cache::{
    create_strategy, CacheStats, CacheStrategy, CacheStrategyExt, GetOptions, SetOptions,
};
pub use config::{Config, StrategyKind};
pub use error::{CacheError, Result};
pub use tasks::spawn_cleanup_task;
