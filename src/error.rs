//! Error types for the cache strategies
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for every cache strategy.
///
/// Read paths never surface corrupt entries through this type; they are
/// reported as misses and removed.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The selected backend was compiled out of this build
    #[error(
        "{backend} cache strategy requires the `{dependency}` crate. \
         Rebuild with it enabled: cargo build --features {feature}"
    )]
    BackendUnavailable {
        backend: &'static str,
        dependency: &'static str,
        feature: &'static str,
    },

    /// Could not establish the backend connection or open the store
    #[error("Connection error: {0}")]
    Connection(String),

    /// Redis command or pipeline failure
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// SQLite statement or transaction failure
    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Value could not be encoded for storage
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem failure while preparing a store
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Key pattern could not be compiled
    #[error("Invalid key pattern: {0}")]
    InvalidPattern(String),

    /// Configuration value could not be understood
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A blocking backend task panicked or was cancelled
    #[error("Backend task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for CacheError {
    fn from(err: tokio::task::JoinError) -> Self {
        CacheError::Task(err.to_string())
    }
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
