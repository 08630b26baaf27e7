//! SQLite Strategy
//!
//! Two tables: `cache_entries` holds one row per key and `cache_tags` holds
//! one row per (key, tag) pair, cascading on entry deletion. Every multi-row
//! write runs in a transaction, so unlike the Redis pipeline these writes are
//! isolated from other connections to the same file.
//!
//! rusqlite is synchronous; each operation runs on the blocking pool with the
//! connection behind a mutex.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, ToSql, Transaction};
use serde_json::Value;
use tracing::{debug, info};

use crate::cache::entry::{current_timestamp_ms, dedup_tags, expiry_from_ttl, is_expired_at};
use crate::cache::pattern::filter_keys;
use crate::cache::{CacheStats, CacheStrategy, GetOptions, SetOptions};
use crate::error::{CacheError, Result};

/// Used when neither an explicit path nor `CACHE_SQLITE_PATH` is given.
pub const DEFAULT_SQLITE_PATH: &str = ".cache.db";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS cache_entries (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        expires_at INTEGER,
        created_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS cache_tags (
        key TEXT NOT NULL,
        tag TEXT NOT NULL,
        PRIMARY KEY (key, tag),
        FOREIGN KEY (key) REFERENCES cache_entries(key) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_cache_tags_tag ON cache_tags(tag);
    CREATE INDEX IF NOT EXISTS idx_cache_entries_expires_at ON cache_entries(expires_at);
";

/// Rows `cleanup()` removes: expired, or holding a value that is not JSON.
const STALE_PREDICATE: &str =
    "(expires_at IS NOT NULL AND expires_at < ?1) OR json_valid(value) = 0";

/// Picks the database file: explicit path, then `CACHE_SQLITE_PATH`, then
/// [`DEFAULT_SQLITE_PATH`].
pub fn resolve_sqlite_path<F>(explicit: Option<&Path>, lookup: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    explicit
        .map(Path::to_path_buf)
        .or_else(|| {
            lookup("CACHE_SQLITE_PATH")
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
        })
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SQLITE_PATH))
}

/// Opens the database file, creating its directory and schema if missing.
fn open_connection(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }

    let conn = Connection::open(path).map_err(|e| {
        CacheError::Connection(format!("cannot open SQLite cache {}: {}", path.display(), e))
    })?;
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.execute_batch(SCHEMA)?;

    info!(path = %path.display(), "Opened SQLite cache");
    Ok(conn)
}

/// Deletes one entry and its tag rows in a transaction.
fn delete_entry(conn: &mut Connection, key: &str) -> Result<bool> {
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM cache_tags WHERE key = ?1", params![key])?;
    let changed = tx.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
    tx.commit()?;
    Ok(changed > 0)
}

/// Deletes one entry and its tag rows only while the entry row still
/// satisfies `condition`, which may reference `?2` bound to `guard`.
fn delete_entry_where(
    tx: &Transaction<'_>,
    key: &str,
    condition: &str,
    guard: &dyn ToSql,
) -> Result<bool> {
    tx.execute(
        &format!(
            "DELETE FROM cache_tags WHERE key = ?1 AND EXISTS
             (SELECT 1 FROM cache_entries WHERE key = ?1 AND {})",
            condition
        ),
        params![key, guard],
    )?;
    let changed = tx.execute(
        &format!("DELETE FROM cache_entries WHERE key = ?1 AND {}", condition),
        params![key, guard],
    )?;
    Ok(changed > 0)
}

/// Reads one value, removing it instead when it is corrupt or expired.
///
/// The read and the removal share a transaction, and the removal only
/// matches the row that was read, so a write that replaced it in between
/// survives.
fn read_entry(
    conn: &mut Connection,
    key: &str,
    now: i64,
    return_expired: bool,
) -> Result<Option<Value>> {
    let tx = conn.transaction()?;
    let row: Option<(String, Option<i64>)> = tx
        .query_row(
            "SELECT value, expires_at FROM cache_entries WHERE key = ?1",
            params![key],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let Some((raw, expires_at)) = row else {
        return Ok(None);
    };

    let value: Value = match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(_) => {
            delete_entry_where(&tx, key, "value = ?2", &raw)?;
            tx.commit()?;
            debug!(key, "Removed corrupt cache entry");
            return Ok(None);
        }
    };

    if is_expired_at(expires_at, now) && !return_expired {
        delete_entry_where(&tx, key, "expires_at IS NOT NULL AND expires_at < ?2", &now)?;
        tx.commit()?;
        debug!(key, "Removed expired entry on read");
        return Ok(None);
    }
    Ok(Some(value))
}

// == SQLite Strategy ==
/// Cache strategy backed by an embedded SQLite file.
pub struct SqliteStrategy {
    path: PathBuf,
    default_ttl: Option<u64>,
    /// Opened on first use; `close()` resets it to None
    connection: Arc<Mutex<Option<Connection>>>,
}

impl SqliteStrategy {
    // == Constructor ==
    /// Creates a strategy for `path` (or the environment fallback). The file
    /// is not opened until the first operation.
    pub fn new(path: Option<&Path>, default_ttl: Option<u64>) -> Self {
        Self {
            path: resolve_sqlite_path(path, |name| std::env::var(name).ok()),
            default_ttl,
            connection: Arc::new(Mutex::new(None)),
        }
    }

    /// The resolved database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `f` on the blocking pool against the shared connection, opening
    /// it first if needed. The mutex is held while opening, so concurrent
    /// first calls open the file once.
    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let slot = Arc::clone(&self.connection);
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || {
            let mut guard = slot
                .lock()
                .map_err(|_| CacheError::Task("SQLite connection lock poisoned".to_string()))?;
            if guard.is_none() {
                *guard = Some(open_connection(&path)?);
            }
            let conn = guard
                .as_mut()
                .ok_or_else(|| CacheError::Connection("SQLite connection unavailable".to_string()))?;
            f(conn)
        })
        .await?
    }
}

#[async_trait]
impl CacheStrategy for SqliteStrategy {
    async fn get(&self, key: &str, options: GetOptions) -> Result<Option<Value>> {
        let key = key.to_string();
        let return_expired = options.return_expired;
        self.with_conn(move |conn| {
            read_entry(conn, &key, current_timestamp_ms(), return_expired)
        })
        .await
    }

    async fn set(&self, key: &str, value: Value, options: SetOptions) -> Result<()> {
        let key = key.to_string();
        let serialized = serde_json::to_string(&value)?;
        let tags = dedup_tags(&options.tags);
        let created_at = current_timestamp_ms();
        let expires_at = expiry_from_ttl(created_at, options.effective_ttl(self.default_ttl));

        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM cache_tags WHERE key = ?1", params![key])?;
            tx.execute(
                "INSERT INTO cache_entries (key, value, expires_at, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(key) DO UPDATE SET
                     value = excluded.value,
                     expires_at = excluded.expires_at,
                     created_at = excluded.created_at",
                params![key, serialized, expires_at, created_at],
            )?;
            {
                let mut insert_tag =
                    tx.prepare("INSERT INTO cache_tags (key, tag) VALUES (?1, ?2)")?;
                for tag in &tags {
                    insert_tag.execute(params![key, tag])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn has(&self, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            Ok(read_entry(conn, &key, current_timestamp_ms(), false)?.is_some())
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.with_conn(move |conn| delete_entry(conn, &key)).await
    }

    async fn delete_by_tags(&self, tags: &[String]) -> Result<usize> {
        if tags.is_empty() {
            return Ok(0);
        }

        let tags = tags.to_vec();
        let keys: Vec<String> = self
            .with_conn(move |conn| {
                let placeholders = vec!["?"; tags.len()].join(", ");
                let sql = format!(
                    "SELECT DISTINCT key FROM cache_tags WHERE tag IN ({})",
                    placeholders
                );
                let mut stmt = conn.prepare(&sql)?;
                let keys = stmt
                    .query_map(params_from_iter(tags.iter()), |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                Ok(keys)
            })
            .await?;

        let mut deleted = 0;
        for key in &keys {
            if self.delete(key).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn clear(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let count: i64 =
                tx.query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))?;
            tx.execute("DELETE FROM cache_tags", [])?;
            tx.execute("DELETE FROM cache_entries", [])?;
            tx.commit()?;
            Ok(usize::try_from(count).unwrap_or(0))
        })
        .await
    }

    async fn keys(&self, pattern: Option<&str>) -> Result<Vec<String>> {
        let keys = self
            .with_conn(|conn| {
                let mut stmt = conn.prepare("SELECT key FROM cache_entries")?;
                let keys = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                Ok(keys)
            })
            .await?;
        filter_keys(keys, pattern)
    }

    async fn stats(&self) -> Result<CacheStats> {
        let now = current_timestamp_ms();
        self.with_conn(move |conn| {
            let size: i64 =
                conn.query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))?;
            let expired: i64 = conn.query_row(
                "SELECT COUNT(*) FROM cache_entries
                 WHERE expires_at IS NOT NULL AND expires_at < ?1",
                params![now],
                |row| row.get(0),
            )?;
            Ok(CacheStats::new(
                usize::try_from(size).unwrap_or(0),
                usize::try_from(expired).unwrap_or(0),
            ))
        })
        .await
    }

    async fn cleanup(&self) -> Result<usize> {
        let now = current_timestamp_ms();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                &format!(
                    "DELETE FROM cache_tags WHERE key IN
                     (SELECT key FROM cache_entries WHERE {})",
                    STALE_PREDICATE
                ),
                params![now],
            )?;
            let removed = tx.execute(
                &format!("DELETE FROM cache_entries WHERE {}", STALE_PREDICATE),
                params![now],
            )?;
            tx.commit()?;
            Ok(removed)
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        let slot = Arc::clone(&self.connection);
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || {
            let mut guard = slot
                .lock()
                .map_err(|_| CacheError::Task("SQLite connection lock poisoned".to_string()))?;
            if let Some(conn) = guard.take() {
                conn.close().map_err(|(_, e)| CacheError::Sqlite(e))?;
                info!(path = %path.display(), "Closed SQLite cache");
            }
            Ok(())
        })
        .await?
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}
