//! Configuration Module
//!
//! Selects the cache strategy and its connection settings from environment
//! variables.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{CacheError, Result};

// == Strategy Kind ==
/// Which backend `create_strategy` builds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StrategyKind {
    #[default]
    Memory,
    Redis,
    Sqlite,
}

impl FromStr for StrategyKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StrategyKind::Memory),
            "redis" => Ok(StrategyKind::Redis),
            "sqlite" => Ok(StrategyKind::Sqlite),
            other => Err(CacheError::InvalidConfig(format!(
                "unknown CACHE_STRATEGY '{}' (expected memory, redis or sqlite)",
                other
            ))),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrategyKind::Memory => "memory",
            StrategyKind::Redis => "redis",
            StrategyKind::Sqlite => "sqlite",
        };
        f.write_str(name)
    }
}

/// Cache configuration parameters.
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend to build
    pub strategy: StrategyKind,
    /// Redis target; None lets the strategy fall back to `REDIS_URL` /
    /// `CACHE_REDIS_URL` / localhost
    pub redis_url: Option<String>,
    /// SQLite file; None lets the strategy fall back to `CACHE_SQLITE_PATH` /
    /// `.cache.db`
    pub sqlite_path: Option<PathBuf>,
    /// Default TTL in milliseconds for entries without explicit TTL
    pub default_ttl: Option<u64>,
    /// Background cleanup task interval in seconds
    pub cleanup_interval: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_STRATEGY` - `memory`, `redis` or `sqlite` (default: memory)
    /// - `REDIS_URL`, `CACHE_REDIS_URL` - Redis target
    /// - `CACHE_SQLITE_PATH` - SQLite database file
    /// - `CACHE_DEFAULT_TTL` - Default TTL in milliseconds (default: none)
    /// - `CACHE_CLEANUP_INTERVAL` - Sweep frequency in seconds (default: 60)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`Config::from_env`] but reads variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let strategy = match lookup("CACHE_STRATEGY") {
            Some(value) if !value.trim().is_empty() => value.parse()?,
            _ => StrategyKind::default(),
        };

        let defaults = Self::default();
        Ok(Self {
            strategy,
            redis_url: non_empty(lookup("REDIS_URL"))
                .or_else(|| non_empty(lookup("CACHE_REDIS_URL"))),
            sqlite_path: non_empty(lookup("CACHE_SQLITE_PATH")).map(PathBuf::from),
            default_ttl: lookup("CACHE_DEFAULT_TTL")
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|ttl| *ttl > 0),
            cleanup_interval: lookup("CACHE_CLEANUP_INTERVAL")
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or(defaults.cleanup_interval),
        })
    }
}

/// Treats a set-but-empty variable as unset.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Memory,
            redis_url: None,
            sqlite_path: None,
            default_ttl: None,
            cleanup_interval: 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.strategy, StrategyKind::Memory);
        assert_eq!(config.default_ttl, None);
        assert_eq!(config.cleanup_interval, 60);
    }

    #[test]
    fn test_config_from_empty_env() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.strategy, StrategyKind::Memory);
        assert!(config.redis_url.is_none());
        assert!(config.sqlite_path.is_none());
        assert_eq!(config.cleanup_interval, 60);
    }

    #[test]
    fn test_config_reads_all_variables() {
        let config = Config::from_lookup(lookup_from(&[
            ("CACHE_STRATEGY", "SQLite"),
            ("CACHE_SQLITE_PATH", "/var/cache/app.db"),
            ("CACHE_DEFAULT_TTL", "30000"),
            ("CACHE_CLEANUP_INTERVAL", "5"),
        ]))
        .unwrap();

        assert_eq!(config.strategy, StrategyKind::Sqlite);
        assert_eq!(config.sqlite_path, Some(PathBuf::from("/var/cache/app.db")));
        assert_eq!(config.default_ttl, Some(30_000));
        assert_eq!(config.cleanup_interval, 5);
    }

    #[test]
    fn test_config_redis_url_precedence() {
        let config = Config::from_lookup(lookup_from(&[
            ("CACHE_STRATEGY", "redis"),
            ("CACHE_REDIS_URL", "redis://secondary:6379"),
        ]))
        .unwrap();
        assert_eq!(config.redis_url.as_deref(), Some("redis://secondary:6379"));

        let config = Config::from_lookup(lookup_from(&[
            ("REDIS_URL", "redis://primary:6379"),
            ("CACHE_REDIS_URL", "redis://secondary:6379"),
        ]))
        .unwrap();
        assert_eq!(config.redis_url.as_deref(), Some("redis://primary:6379"));
    }

    #[test]
    fn test_config_empty_values_fall_through() {
        let config = Config::from_lookup(lookup_from(&[
            ("REDIS_URL", ""),
            ("CACHE_REDIS_URL", "redis://secondary:6379"),
            ("CACHE_SQLITE_PATH", ""),
        ]))
        .unwrap();
        assert_eq!(config.redis_url.as_deref(), Some("redis://secondary:6379"));
        assert!(config.sqlite_path.is_none());
    }

    #[test]
    fn test_config_rejects_unknown_strategy() {
        let result = Config::from_lookup(lookup_from(&[("CACHE_STRATEGY", "memcached")]));
        assert!(matches!(result, Err(CacheError::InvalidConfig(_))));
    }

    #[test]
    fn test_config_ignores_bad_numbers() {
        let config = Config::from_lookup(lookup_from(&[
            ("CACHE_DEFAULT_TTL", "soon"),
            ("CACHE_CLEANUP_INTERVAL", "0"),
        ]))
        .unwrap();
        assert_eq!(config.default_ttl, None);
        assert_eq!(config.cleanup_interval, 60);
    }

    #[test]
    fn test_strategy_kind_display_round_trip() {
        for kind in [StrategyKind::Memory, StrategyKind::Redis, StrategyKind::Sqlite] {
            assert_eq!(kind.to_string().parse::<StrategyKind>().unwrap(), kind);
        }
    }
}
