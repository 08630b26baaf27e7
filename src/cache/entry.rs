//! Cache Entry Module
//!
//! Defines the unit of storage and its serialized form.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

// == Cache Entry ==
/// A single cache entry: value, tags and expiry metadata.
///
/// Serialized as `{"key", "value", "tags", "expiresAt", "createdAt"}`, which is
/// the record format stored under `cache:{key}` in Redis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Raw cache key (no backend prefix)
    pub key: String,
    /// The stored payload
    pub value: Value,
    /// Tags used for group invalidation
    pub tags: Vec<String>,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<i64>,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new entry stamped with the current time.
    ///
    /// # Arguments
    /// * `key` - The raw cache key
    /// * `value` - The value to store
    /// * `tags` - Tags, already deduplicated
    /// * `ttl_ms` - Optional TTL in milliseconds; `Some(0)` means no expiry
    pub fn new(key: &str, value: Value, tags: Vec<String>, ttl_ms: Option<u64>) -> Self {
        let now = current_timestamp_ms();
        Self {
            key: key.to_string(),
            value,
            tags,
            expires_at: expiry_from_ttl(now, ttl_ms),
            created_at: now,
        }
    }

    // == Is Expired ==
    /// Checks whether the entry is past its expiration time.
    pub fn is_expired(&self) -> bool {
        is_expired_at(self.expires_at, current_timestamp_ms())
    }

    // == Codec ==
    /// Serializes the entry to its stored JSON form.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses a stored record. Returns None for corrupt data.
    pub fn decode(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Absolute expiry for a TTL measured from `now`. A zero TTL never expires.
pub fn expiry_from_ttl(now: i64, ttl_ms: Option<u64>) -> Option<i64> {
    match ttl_ms {
        Some(ttl) if ttl > 0 => Some(now.saturating_add(i64::try_from(ttl).unwrap_or(i64::MAX))),
        _ => None,
    }
}

/// An entry is expired once `now` is strictly past `expires_at`.
pub fn is_expired_at(expires_at: Option<i64>, now: i64) -> bool {
    match expires_at {
        Some(expires) => now > expires,
        None => false,
    }
}

/// Removes duplicate tags, keeping first occurrence order.
pub fn dedup_tags(tags: &[String]) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        if !unique.contains(tag) {
            unique.push(tag.clone());
        }
    }
    unique
}
