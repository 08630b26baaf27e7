//! In-Memory Strategy
//!
//! Process-local cache: a HashMap of entries plus a tag index, both behind a
//! single RwLock so every write updates them together.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::cache::entry::{current_timestamp_ms, dedup_tags, is_expired_at};
use crate::cache::pattern::filter_keys;
use crate::cache::{CacheEntry, CacheStats, CacheStrategy, GetOptions, SetOptions};
use crate::error::Result;

// == Memory State ==
#[derive(Debug, Default)]
struct MemoryState {
    /// Key-value storage
    entries: HashMap<String, CacheEntry>,
    /// tag -> keys carrying it
    tags: HashMap<String, HashSet<String>>,
}

impl MemoryState {
    /// Removes an entry and unlinks it from the tag index.
    fn remove(&mut self, key: &str) -> bool {
        let Some(entry) = self.entries.remove(key) else {
            return false;
        };
        for tag in &entry.tags {
            if let Some(members) = self.tags.get_mut(tag) {
                members.remove(key);
                if members.is_empty() {
                    self.tags.remove(tag);
                }
            }
        }
        true
    }

    fn insert(&mut self, entry: CacheEntry) {
        self.remove(&entry.key);
        for tag in &entry.tags {
            self.tags
                .entry(tag.clone())
                .or_default()
                .insert(entry.key.clone());
        }
        self.entries.insert(entry.key.clone(), entry);
    }
}

// == Memory Strategy ==
/// Cache strategy held entirely in process memory.
#[derive(Debug, Default)]
pub struct MemoryStrategy {
    state: RwLock<MemoryState>,
    /// Default TTL in milliseconds for entries without explicit TTL
    default_ttl: Option<u64>,
}

impl MemoryStrategy {
    // == Constructor ==
    /// Creates an empty cache with an optional default TTL in milliseconds.
    pub fn new(default_ttl: Option<u64>) -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            default_ttl,
        }
    }
}

#[async_trait]
impl CacheStrategy for MemoryStrategy {
    async fn get(&self, key: &str, options: GetOptions) -> Result<Option<Value>> {
        {
            let state = self.state.read().await;
            match state.entries.get(key) {
                None => return Ok(None),
                Some(entry) if !entry.is_expired() || options.return_expired => {
                    return Ok(Some(entry.value.clone()));
                }
                Some(_) => {}
            }
        }

        // Expired: re-check under the write lock, a concurrent set may have refreshed it
        let mut state = self.state.write().await;
        if state.entries.get(key).is_some_and(CacheEntry::is_expired) {
            state.remove(key);
            debug!(key, "Removed expired entry on read");
            return Ok(None);
        }
        Ok(state.entries.get(key).map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: Value, options: SetOptions) -> Result<()> {
        let ttl = options.effective_ttl(self.default_ttl);
        let entry = CacheEntry::new(key, value, dedup_tags(&options.tags), ttl);

        self.state.write().await.insert(entry);
        Ok(())
    }

    async fn has(&self, key: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.entries.get(key) {
            None => Ok(false),
            Some(entry) if entry.is_expired() => {
                state.remove(key);
                Ok(false)
            }
            Some(_) => Ok(true),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.state.write().await.remove(key))
    }

    async fn delete_by_tags(&self, tags: &[String]) -> Result<usize> {
        let mut state = self.state.write().await;
        let keys: HashSet<String> = tags
            .iter()
            .filter_map(|tag| state.tags.get(tag))
            .flat_map(|members| members.iter().cloned())
            .collect();

        Ok(keys.iter().filter(|key| state.remove(key)).count())
    }

    async fn clear(&self) -> Result<usize> {
        let mut state = self.state.write().await;
        let count = state.entries.len();
        state.entries.clear();
        state.tags.clear();
        Ok(count)
    }

    async fn keys(&self, pattern: Option<&str>) -> Result<Vec<String>> {
        let keys = self.state.read().await.entries.keys().cloned().collect();
        filter_keys(keys, pattern)
    }

    async fn stats(&self) -> Result<CacheStats> {
        let state = self.state.read().await;
        let now = current_timestamp_ms();
        let expired = state
            .entries
            .values()
            .filter(|entry| is_expired_at(entry.expires_at, now))
            .count();
        Ok(CacheStats::new(state.entries.len(), expired))
    }

    async fn cleanup(&self) -> Result<usize> {
        let mut state = self.state.write().await;
        let now = current_timestamp_ms();
        let expired_keys: Vec<String> = state
            .entries
            .values()
            .filter(|entry| is_expired_at(entry.expires_at, now))
            .map(|entry| entry.key.clone())
            .collect();

        for key in &expired_keys {
            state.remove(key);
        }
        Ok(expired_keys.len())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
