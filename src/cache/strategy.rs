//! Strategy Contract
//!
//! The interface every cache backend implements. Callers only ever see keys,
//! JSON values and options; storage layout stays inside each backend.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::cache::CacheStats;
use crate::error::Result;

// == Options ==
/// Options for [`CacheStrategy::get`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GetOptions {
    /// Return the value of an expired entry instead of removing it
    pub return_expired: bool,
}

impl GetOptions {
    pub fn return_expired() -> Self {
        Self {
            return_expired: true,
        }
    }
}

/// Options for [`CacheStrategy::set`].
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// TTL in milliseconds. Falls back to the strategy default when None;
    /// `Some(0)` stores without expiry.
    pub ttl: Option<u64>,
    /// Tags for group invalidation
    pub tags: Vec<String>,
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl_ms: u64) -> Self {
        self.ttl = Some(ttl_ms);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// TTL after applying the strategy-wide default.
    pub fn effective_ttl(&self, default_ttl: Option<u64>) -> Option<u64> {
        self.ttl.or(default_ttl)
    }
}

// == Cache Strategy ==
/// Tag-aware, TTL-aware cache backend.
///
/// All backends return identical results for the same sequence of calls.
/// They differ in isolation: SQLite writes are transactions, Redis writes are
/// MULTI/EXEC pipelines (applied together, but concurrent writers to the same
/// key race with last-write-wins).
#[async_trait]
pub trait CacheStrategy: Send + Sync {
    /// Returns the value, or None if absent, corrupt or expired.
    ///
    /// Expired entries are deleted unless `return_expired` is set, in which
    /// case the stale value is returned and the entry is left in place.
    async fn get(&self, key: &str, options: GetOptions) -> Result<Option<Value>>;

    /// Stores `value`, replacing any previous entry and its tags as one unit.
    async fn set(&self, key: &str, value: Value, options: SetOptions) -> Result<()>;

    /// False if absent or expired; expired entries are deleted.
    async fn has(&self, key: &str) -> Result<bool>;

    /// Removes an entry and its tag associations. True if it existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Deletes every entry carrying any of `tags`; returns distinct keys removed.
    ///
    /// Each key is deleted on its own, so a failure part way leaves earlier
    /// deletions applied.
    async fn delete_by_tags(&self, tags: &[String]) -> Result<usize>;

    /// Removes all entries and tag associations; returns the prior entry count.
    async fn clear(&self) -> Result<usize>;

    /// Lists keys, optionally filtered by a whole-key glob (`*`, `?`). Sorted.
    async fn keys(&self, pattern: Option<&str>) -> Result<Vec<String>>;

    /// Entry counts, including expired entries not yet cleaned up.
    async fn stats(&self) -> Result<CacheStats>;

    /// Removes expired and corrupt entries; returns how many were removed.
    async fn cleanup(&self) -> Result<usize>;

    /// Releases the backend handle. Safe to call repeatedly.
    async fn close(&self) -> Result<()>;

    /// Backend label used in logs.
    fn name(&self) -> &'static str;
}

// == Typed Access ==
/// Serde-typed helpers over any [`CacheStrategy`].
#[async_trait]
pub trait CacheStrategyExt: CacheStrategy {
    /// Reads a value and deserializes it. A value of the wrong shape is a miss.
    async fn get_as<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        let Some(value) = self.get(key, GetOptions::default()).await? else {
            return Ok(None);
        };
        match serde_json::from_value(value) {
            Ok(typed) => Ok(Some(typed)),
            Err(e) => {
                debug!(key, error = %e, "Cached value has unexpected shape");
                Ok(None)
            }
        }
    }

    /// Serializes `value` and stores it.
    async fn set_as<T>(&self, key: &str, value: &T, options: SetOptions) -> Result<()>
    where
        T: Serialize + Sync,
    {
        let value = serde_json::to_value(value)?;
        self.set(key, value, options).await
    }
}

impl<S: CacheStrategy + ?Sized> CacheStrategyExt for S {}
