//! Local Cache Store
//!
//! The [`CacheStore`] trait is the key-value boundary the report cache
//! writes through, and [`MemoryCacheStore`] is its in-process backend.
//!
//! # Features
//!
//! - Entries carry an absolute expiry (epoch milliseconds)
//! - Reads return expired entries too; expiry is the reader's decision
//! - Oldest-first eviction when at capacity, expired entries go first
//! - Thread-safe with RwLock
//!
//! # Example
//!
//! ```rust
//! use tally_reports::cache::{CacheStore, MemoryCacheStore};
//! use serde_json::json;
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let store = MemoryCacheStore::new(1000);
//! store.put("report:abc", json!({"total": 5}), 3600).await.unwrap();
//!
//! let stored = store.get("report:abc").await.unwrap().unwrap();
//! assert_eq!(stored.data["total"], json!(5));
//! # });
//! ```

use crate::error::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Longest TTL a store accepts (one year)
pub const MAX_TTL_SECONDS: u64 = 365 * 24 * 60 * 60;

/// Entry as held by a cache store
#[derive(Clone, Debug, PartialEq)]
pub struct StoredEntry {
    /// The cached data
    pub data: Value,
    /// Expiry timestamp (milliseconds since epoch)
    pub expires_at_ms: i64,
    /// Timestamp when cached (milliseconds since epoch)
    cached_at_ms: i64,
}

impl StoredEntry {
    /// Create an entry expiring `ttl_seconds` from now
    pub fn new(data: Value, ttl_seconds: u64) -> Self {
        let now = Utc::now().timestamp_millis();
        let ttl_ms = ttl_seconds.min(MAX_TTL_SECONDS) as i64 * 1000;
        Self {
            data,
            expires_at_ms: now + ttl_ms,
            cached_at_ms: now,
        }
    }

    /// Check if the entry has expired
    ///
    /// An entry is live only while `expires_at_ms` is strictly in the future.
    pub fn is_expired(&self) -> bool {
        self.expires_at_ms <= Utc::now().timestamp_millis()
    }

    /// Get remaining TTL in milliseconds (0 if expired)
    pub fn remaining_ttl_ms(&self) -> i64 {
        (self.expires_at_ms - Utc::now().timestamp_millis()).max(0)
    }
}

/// Key-value store backing the report cache
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read an entry, expired or not
    async fn get(&self, key: &str) -> Result<Option<StoredEntry>>;

    /// Write an entry, overwriting any previous value for the key
    async fn put(&self, key: &str, data: Value, ttl_seconds: u64) -> Result<()>;
}

/// In-memory cache store with capacity-bounded eviction
pub struct MemoryCacheStore {
    /// Cached entries
    entries: RwLock<HashMap<String, StoredEntry>>,
    /// Maximum number of entries
    max_entries: usize,
}

impl MemoryCacheStore {
    /// Create a new store holding at most `max_entries` entries
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries: max_entries.max(1),
        }
    }

    /// Remove a specific entry from the store
    pub async fn remove(&self, key: &str) -> Option<StoredEntry> {
        self.entries.write().await.remove(key)
    }

    /// Clear all entries from the store
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Get current entry count (including expired)
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Check if store is empty
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Get count of valid (non-expired) entries
    pub async fn valid_count(&self) -> usize {
        let entries = self.entries.read().await;
        entries.values().filter(|v| !v.is_expired()).count()
    }

    /// Remove all expired entries
    ///
    /// Returns the number of entries removed.
    pub async fn cleanup_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, v| !v.is_expired());
        before - entries.len()
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.max_entries
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<StoredEntry>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, data: Value, ttl_seconds: u64) -> Result<()> {
        let mut entries = self.entries.write().await;

        if !entries.contains_key(key) && entries.len() >= self.max_entries {
            entries.retain(|_, v| !v.is_expired());

            if entries.len() >= self.max_entries {
                let oldest_key = entries
                    .iter()
                    .min_by_key(|(_, v)| v.cached_at_ms)
                    .map(|(k, _)| k.clone());

                if let Some(k) = oldest_key {
                    entries.remove(&k);
                }
            }
        }

        entries.insert(key.to_string(), StoredEntry::new(data, ttl_seconds));
        Ok(())
    }
}
