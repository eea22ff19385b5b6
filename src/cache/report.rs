//! Report Cache
//!
//! TTL cache for generated reports, written through a [`CacheStore`].
//! Supports:
//! - Canonical, content-hashed cache keys from request parameters
//! - Expiry checked on every read (`expiresAt > now`)
//! - Hit/miss counters for monitoring
//!
//! Entries are never invalidated explicitly. A changed request produces a
//! different key, and stale entries stay in the store until overwritten or
//! evicted by the store itself.

use crate::cache::local::{CacheStore, MAX_TTL_SECONDS};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

// ============================================================================
// Cache Configuration
// ============================================================================

/// Configuration for report caching
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Enable cache (default: true)
    pub enabled: bool,

    /// TTL for cached reports in seconds (default: 3600)
    pub ttl_seconds: u64,

    /// Maximum number of cached entries for in-process stores (default: 10,000)
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: 3600,
            max_entries: 10_000,
        }
    }
}

impl CacheConfig {
    /// Set the report TTL
    pub fn with_ttl_seconds(mut self, seconds: u64) -> Self {
        self.ttl_seconds = seconds;
        self
    }

    /// Set maximum entries
    pub fn with_max_entries(mut self, entries: usize) -> Self {
        self.max_entries = entries;
        self
    }

    /// Disable caching
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// TTL actually applied to entries, capped at one year
    pub fn effective_ttl_seconds(&self) -> u64 {
        self.ttl_seconds.min(MAX_TTL_SECONDS)
    }

    /// Expiry in epoch milliseconds for an entry generated at `generated_at`
    pub fn expires_at(&self, generated_at: DateTime<Utc>) -> i64 {
        let ttl_ms = (self.effective_ttl_seconds() as i64).saturating_mul(1000);
        generated_at.timestamp_millis().saturating_add(ttl_ms)
    }
}

// ============================================================================
// Cache Keys
// ============================================================================

/// Sort mapping keys recursively
///
/// Two logically equal requests canonicalize to the same value whatever
/// the order their keys were inserted in. Array order is significant and
/// kept.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let sorted: Map<String, Value> = keys
                .into_iter()
                .map(|k| (k.clone(), canonicalize(&map[k])))
                .collect();
            Value::Object(sorted)
        },
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Derive the cache key for a report request
///
/// Hashes the canonical JSON of the request's fields merged with
/// `userId`. Non-object requests are nested under `filters`.
pub fn generate_cache_key(filters: &Value, user_id: &str) -> String {
    let mut merged = match filters {
        Value::Object(map) => map.clone(),
        other => {
            let mut map = Map::new();
            map.insert("filters".to_string(), other.clone());
            map
        },
    };
    merged.insert("userId".to_string(), Value::String(user_id.to_string()));

    let canonical = canonicalize(&Value::Object(merged));
    // serde_json writes map entries in iteration order, which is now sorted
    let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
    blake3::hash(&bytes).to_hex().to_string()
}

// ============================================================================
// Cache Entry
// ============================================================================

/// A cached report as persisted in the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Content-hash key
    pub cache_key: String,
    /// Full report envelope
    pub report_data: Value,
    /// Report flavor (`time`, `project`)
    pub report_type: String,
    /// When the report was generated
    pub generated_at: DateTime<Utc>,
    /// Expiry (milliseconds since epoch)
    pub expires_at: i64,
    /// Serialized size of `report_data` in bytes
    pub data_size: usize,
}

impl CacheEntry {
    /// Whether the entry is still fresh at `now_ms`
    pub fn is_fresh_at(&self, now_ms: i64) -> bool {
        self.expires_at > now_ms
    }
}

// ============================================================================
// Report Cache
// ============================================================================

/// Cache statistics
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Fresh entries returned
    pub hits: AtomicU64,

    /// Lookups that found nothing fresh
    pub misses: AtomicU64,

    /// Store reads or writes that failed
    pub errors: AtomicU64,
}

/// TTL cache for generated reports
pub struct ReportCache {
    store: Arc<dyn CacheStore>,
    config: CacheConfig,
    stats: CacheStats,
}

impl ReportCache {
    /// Create a report cache over a store
    pub fn new(store: Arc<dyn CacheStore>, config: CacheConfig) -> Self {
        Self {
            store,
            config,
            stats: CacheStats::default(),
        }
    }

    /// Cache configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up a fresh entry
    ///
    /// Expired entries, unreadable entries and store failures all read as
    /// a miss.
    pub async fn get(&self, key: &str) -> Option<CacheEntry> {
        if !self.config.enabled {
            return None;
        }

        let stored = match self.store.get(key).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(key, error = %e, "Report cache read failed");
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                None
            },
        };

        let now = Utc::now().timestamp_millis();
        let entry = stored
            .and_then(|s| serde_json::from_value::<CacheEntry>(s.data).ok())
            .filter(|entry| entry.is_fresh_at(now));

        match entry {
            Some(entry) => {
                debug!(key, report_type = %entry.report_type, "Report cache hit");
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry)
            },
            None => {
                debug!(key, "Report cache miss");
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            },
        }
    }

    /// Build the entry for a report and write it to the store
    ///
    /// The returned entry is valid even when the write fails; callers
    /// decide whether a failed write matters.
    pub async fn put(&self, key: &str, report_type: &str, report: Value) -> (CacheEntry, Result<()>) {
        let generated_at = Utc::now();
        let data_size = serde_json::to_vec(&report).map(|b| b.len()).unwrap_or(0);
        let entry = CacheEntry {
            cache_key: key.to_string(),
            report_data: report,
            report_type: report_type.to_string(),
            generated_at,
            expires_at: self.config.expires_at(generated_at),
            data_size,
        };

        if !self.config.enabled {
            return (entry, Ok(()));
        }

        let result = match serde_json::to_value(&entry) {
            Ok(value) => self.store.put(key, value, self.config.effective_ttl_seconds()).await,
            Err(e) => Err(e.into()),
        };
        if result.is_err() {
            self.stats.errors.fetch_add(1, Ordering::Relaxed);
        }
        (entry, result)
    }

    /// Get cache statistics
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Calculate hit ratio
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.stats.hits.load(Ordering::Relaxed);
        let misses = self.stats.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}
