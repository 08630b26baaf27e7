//! Strategy Factory
//!
//! Builds the configured backend behind `Arc<dyn CacheStrategy>`.

use std::sync::Arc;

use tracing::info;

use crate::cache::{CacheStrategy, MemoryStrategy};
use crate::config::{Config, StrategyKind};
use crate::error::Result;

/// Creates the strategy selected by `config`.
///
/// Backends compiled out of this build fail here with
/// [`crate::error::CacheError::BackendUnavailable`] instead of degrading to another one.
pub fn create_strategy(config: &Config) -> Result<Arc<dyn CacheStrategy>> {
    let strategy: Arc<dyn CacheStrategy> = match config.strategy {
        StrategyKind::Memory => Arc::new(MemoryStrategy::new(config.default_ttl)),
        StrategyKind::Redis => redis_strategy(config)?,
        StrategyKind::Sqlite => sqlite_strategy(config)?,
    };

    info!(
        strategy = strategy.name(),
        default_ttl_ms = ?config.default_ttl,
        "Cache strategy created"
    );
    Ok(strategy)
}

#[cfg(feature = "redis")]
fn redis_strategy(config: &Config) -> Result<Arc<dyn CacheStrategy>> {
    Ok(Arc::new(crate::cache::RedisStrategy::new(
        config.redis_url.as_deref(),
        config.default_ttl,
    )))
}

#[cfg(not(feature = "redis"))]
fn redis_strategy(_config: &Config) -> Result<Arc<dyn CacheStrategy>> {
    Err(crate::error::CacheError::BackendUnavailable {
        backend: "Redis",
        dependency: "redis",
        feature: "redis",
    })
}

#[cfg(feature = "sqlite")]
fn sqlite_strategy(config: &Config) -> Result<Arc<dyn CacheStrategy>> {
    Ok(Arc::new(crate::cache::SqliteStrategy::new(
        config.sqlite_path.as_deref(),
        config.default_ttl,
    )))
}

#[cfg(not(feature = "sqlite"))]
fn sqlite_strategy(_config: &Config) -> Result<Arc<dyn CacheStrategy>> {
    Err(crate::error::CacheError::BackendUnavailable {
        backend: "SQLite",
        dependency: "rusqlite",
        feature: "sqlite",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_is_default() {
        let strategy = create_strategy(&Config::default()).unwrap();
        assert_eq!(strategy.name(), "memory");
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_sqlite_selected_by_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            strategy: StrategyKind::Sqlite,
            sqlite_path: Some(dir.path().join("cache.db")),
            ..Config::default()
        };
        assert_eq!(create_strategy(&config).unwrap().name(), "sqlite");
    }

    #[cfg(feature = "redis")]
    #[test]
    fn test_redis_construction_is_lazy() {
        // No server needed until the first operation
        let config = Config {
            strategy: StrategyKind::Redis,
            redis_url: Some("redis://127.0.0.1:1".to_string()),
            ..Config::default()
        };
        assert_eq!(create_strategy(&config).unwrap().name(), "redis");
    }

    #[cfg(not(feature = "redis"))]
    #[test]
    fn test_redis_unavailable_without_feature() {
        let config = Config {
            strategy: StrategyKind::Redis,
            ..Config::default()
        };
        assert!(matches!(
            create_strategy(&config),
            Err(crate::error::CacheError::BackendUnavailable { dependency: "redis", .. })
        ));
    }
}
