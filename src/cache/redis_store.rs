//! Redis Strategy
//!
//! Storage layout:
//! - `cache:{key}` holds the JSON-encoded [`CacheEntry`]
//! - `tag:{tag}` is a set of raw keys carrying that tag
//!
//! Writes touching both structures go out as one MULTI/EXEC pipeline. That
//! keeps a `set` or `delete` from being observed half-applied, but it is not
//! isolation: two clients writing the same key race and the last pipeline wins.

use std::collections::BTreeMap;

use ::redis::aio::MultiplexedConnection;
use ::redis::{AsyncCommands, Client};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::cache::entry::{current_timestamp_ms, dedup_tags, is_expired_at};
use crate::cache::pattern::filter_keys;
use crate::cache::{CacheEntry, CacheStats, CacheStrategy, GetOptions, SetOptions};
use crate::error::{CacheError, Result};

// == Constants ==
const KEY_PREFIX: &str = "cache:";
const TAG_PREFIX: &str = "tag:";

/// Used when neither an explicit URL nor the environment names a server.
pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";

/// Picks the connection target: explicit URL, then `REDIS_URL`, then
/// `CACHE_REDIS_URL`, then [`DEFAULT_REDIS_URL`].
pub fn resolve_redis_url<F>(explicit: Option<&str>, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |url: &String| !url.is_empty();
    explicit
        .map(str::to_string)
        .filter(non_empty)
        .or_else(|| lookup("REDIS_URL").filter(non_empty))
        .or_else(|| lookup("CACHE_REDIS_URL").filter(non_empty))
        .unwrap_or_else(|| DEFAULT_REDIS_URL.to_string())
}

fn cache_key(key: &str) -> String {
    format!("{}{}", KEY_PREFIX, key)
}

fn tag_key(tag: &str) -> String {
    format!("{}{}", TAG_PREFIX, tag)
}

/// Redis expiry in whole seconds, rounded up.
fn ttl_seconds(ttl_ms: u64) -> u64 {
    ttl_ms.div_ceil(1000)
}

/// Outcome of reading one primary record.
enum Stored {
    Missing,
    Corrupt,
    Entry(CacheEntry),
}

// == Redis Strategy ==
/// Cache strategy backed by a Redis server.
pub struct RedisStrategy {
    url: String,
    default_ttl: Option<u64>,
    /// Opened on first use; `close()` resets it to None
    connection: Mutex<Option<MultiplexedConnection>>,
}

impl RedisStrategy {
    // == Constructor ==
    /// Creates a strategy for `url` (or the environment fallback). No
    /// connection is made until the first operation.
    pub fn new(url: Option<&str>, default_ttl: Option<u64>) -> Self {
        Self {
            url: resolve_redis_url(url, |name| std::env::var(name).ok()),
            default_ttl,
            connection: Mutex::new(None),
        }
    }

    /// The resolved connection target.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the shared connection, opening it on first call. The lock is
    /// held while connecting so concurrent first calls open only one.
    async fn conn(&self) -> Result<MultiplexedConnection> {
        let mut guard = self.connection.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let client = Client::open(self.url.as_str())
            .map_err(|e| CacheError::Connection(format!("invalid Redis URL {}: {}", self.url, e)))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::Connection(format!("Redis connection error: {}", e)))?;

        info!(url = %self.url, "Connected to Redis cache");
        *guard = Some(conn.clone());
        Ok(conn)
    }

    async fn read(&self, conn: &mut MultiplexedConnection, key: &str) -> Result<Stored> {
        let data: Option<String> = conn.get(cache_key(key)).await?;
        Ok(match data {
            None => Stored::Missing,
            Some(raw) => match CacheEntry::decode(&raw) {
                Some(entry) => Stored::Entry(entry),
                None => Stored::Corrupt,
            },
        })
    }

    /// Deletes a primary record without touching the tag index.
    async fn force_delete(&self, conn: &mut MultiplexedConnection, key: &str) -> Result<()> {
        let _: () = conn.del(cache_key(key)).await?;
        debug!(key, "Removed corrupt cache entry");
        Ok(())
    }

    /// Drops `key` from the `tag` index after its record has vanished. If a
    /// concurrent `set` recreated the record with that tag, the membership is
    /// restored.
    async fn prune_tag_member(
        &self,
        conn: &mut MultiplexedConnection,
        tag: &str,
        key: &str,
    ) -> Result<()> {
        let _: () = conn.srem(tag_key(tag), key).await?;
        if let Stored::Entry(entry) = self.read(conn, key).await? {
            if entry.tags.iter().any(|t| t == tag) {
                let _: () = conn.sadd(tag_key(tag), key).await?;
                return Ok(());
            }
        }
        debug!(key, tag, "Pruned stale tag index member");
        Ok(())
    }

    /// All raw keys with a primary record.
    async fn raw_keys(&self, conn: &mut MultiplexedConnection) -> Result<Vec<String>> {
        let prefixed: Vec<String> = conn.keys(format!("{}*", KEY_PREFIX)).await?;
        Ok(prefixed
            .into_iter()
            .filter_map(|k| k.strip_prefix(KEY_PREFIX).map(str::to_string))
            .collect())
    }
}

#[async_trait]
impl CacheStrategy for RedisStrategy {
    async fn get(&self, key: &str, options: GetOptions) -> Result<Option<Value>> {
        let mut conn = self.conn().await?;
        match self.read(&mut conn, key).await? {
            Stored::Missing => Ok(None),
            Stored::Corrupt => {
                self.force_delete(&mut conn, key).await?;
                Ok(None)
            }
            Stored::Entry(entry) if entry.is_expired() && !options.return_expired => {
                self.delete(key).await?;
                debug!(key, "Removed expired entry on read");
                Ok(None)
            }
            Stored::Entry(entry) => Ok(Some(entry.value)),
        }
    }

    async fn set(&self, key: &str, value: Value, options: SetOptions) -> Result<()> {
        let mut conn = self.conn().await?;
        let ttl = options.effective_ttl(self.default_ttl);
        let entry = CacheEntry::new(key, value, dedup_tags(&options.tags), ttl);
        let serialized = entry.encode()?;

        let mut pipe = ::redis::pipe();
        pipe.atomic();

        if let Stored::Entry(old) = self.read(&mut conn, key).await? {
            for tag in &old.tags {
                pipe.srem(tag_key(tag), key).ignore();
            }
        }

        match ttl {
            Some(ttl) if ttl > 0 => {
                pipe.set_ex(cache_key(key), serialized, ttl_seconds(ttl)).ignore();
            }
            _ => {
                pipe.set(cache_key(key), serialized).ignore();
            }
        }
        for tag in &entry.tags {
            pipe.sadd(tag_key(tag), key).ignore();
        }

        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn has(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn().await?;
        match self.read(&mut conn, key).await? {
            Stored::Missing => Ok(false),
            Stored::Corrupt => {
                self.force_delete(&mut conn, key).await?;
                Ok(false)
            }
            Stored::Entry(entry) if entry.is_expired() => {
                self.delete(key).await?;
                Ok(false)
            }
            Stored::Entry(_) => Ok(true),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn().await?;
        match self.read(&mut conn, key).await? {
            Stored::Missing => Ok(false),
            Stored::Corrupt => {
                self.force_delete(&mut conn, key).await?;
                Ok(true)
            }
            Stored::Entry(entry) => {
                let mut pipe = ::redis::pipe();
                pipe.atomic();
                for tag in &entry.tags {
                    pipe.srem(tag_key(tag), key).ignore();
                }
                pipe.del(cache_key(key)).ignore();

                let _: () = pipe.query_async(&mut conn).await?;
                Ok(true)
            }
        }
    }

    async fn delete_by_tags(&self, tags: &[String]) -> Result<usize> {
        let mut conn = self.conn().await?;
        let mut members: BTreeMap<String, Vec<&str>> = BTreeMap::new();
        for tag in tags {
            let keys: Vec<String> = conn.smembers(tag_key(tag)).await?;
            for key in keys {
                members.entry(key).or_default().push(tag);
            }
        }

        let mut deleted = 0;
        for (key, key_tags) in &members {
            if self.delete(key).await? {
                deleted += 1;
            } else {
                // Redis expired the record itself; its index entries remain
                for tag in key_tags {
                    self.prune_tag_member(&mut conn, tag, key).await?;
                }
            }
        }
        Ok(deleted)
    }

    async fn clear(&self) -> Result<usize> {
        let mut conn = self.conn().await?;
        let entry_keys: Vec<String> = conn.keys(format!("{}*", KEY_PREFIX)).await?;
        let tag_keys: Vec<String> = conn.keys(format!("{}*", TAG_PREFIX)).await?;

        if entry_keys.is_empty() && tag_keys.is_empty() {
            return Ok(0);
        }

        let mut pipe = ::redis::pipe();
        pipe.atomic();
        for key in entry_keys.iter().chain(tag_keys.iter()) {
            pipe.del(key).ignore();
        }
        let _: () = pipe.query_async(&mut conn).await?;

        // Tag-index keys are removed but not counted
        Ok(entry_keys.len())
    }

    async fn keys(&self, pattern: Option<&str>) -> Result<Vec<String>> {
        let mut conn = self.conn().await?;
        let keys = self.raw_keys(&mut conn).await?;
        filter_keys(keys, pattern)
    }

    async fn stats(&self) -> Result<CacheStats> {
        let mut conn = self.conn().await?;
        let keys = self.raw_keys(&mut conn).await?;
        let now = current_timestamp_ms();

        let mut expired = 0;
        for key in &keys {
            if let Stored::Entry(entry) = self.read(&mut conn, key).await? {
                if is_expired_at(entry.expires_at, now) {
                    expired += 1;
                }
            }
        }
        Ok(CacheStats::new(keys.len(), expired))
    }

    async fn cleanup(&self) -> Result<usize> {
        let mut conn = self.conn().await?;
        let keys = self.raw_keys(&mut conn).await?;
        let now = current_timestamp_ms();

        let mut removed = 0;
        for key in &keys {
            match self.read(&mut conn, key).await? {
                Stored::Missing => {}
                Stored::Corrupt => {
                    self.force_delete(&mut conn, key).await?;
                    removed += 1;
                }
                Stored::Entry(entry) => {
                    if is_expired_at(entry.expires_at, now)
                        && self.delete(key).await?
                    {
                        removed += 1;
                    }
                }
            }
        }
        Ok(removed)
    }

    async fn close(&self) -> Result<()> {
        if self.connection.lock().await.take().is_some() {
            info!(url = %self.url, "Closed Redis cache connection");
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
