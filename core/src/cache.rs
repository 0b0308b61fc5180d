//! Result cache capability.
//!
//! The core never owns a cache. Callers that want reuse across requests
//! inject a ResultCache; tests use NoopCache. Values are stored as JSON
//! strings so any serialisable report can be cached.

use crate::error::RiskResult;
use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

pub trait ResultCache: Send + Sync {
    /// A live entry, or None if absent or expired.
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: String, ttl_seconds: u64);
}

/// Caches nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

impl ResultCache for NoopCache {
    fn get(&self, _key: &str) -> Option<String> {
        None
    }

    fn set(&self, _key: &str, _value: String, _ttl_seconds: u64) {}
}

#[derive(Debug, Clone)]
struct CachedEntry {
    value:      String,
    expires_at: DateTime<Utc>,
}

/// In-process TTL cache.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CachedEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn invalidate(&self, key: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(key);
        }
    }

    pub fn clear_expired(&self) {
        let now = Utc::now();
        if let Ok(mut entries) = self.entries.write() {
            entries.retain(|_, e| e.expires_at > now);
        }
    }
}

impl ResultCache for MemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.read().ok()?;
        entries
            .get(key)
            .filter(|e| Utc::now() < e.expires_at)
            .map(|e| e.value.clone())
    }

    fn set(&self, key: &str, value: String, ttl_seconds: u64) {
        let ttl = i64::try_from(ttl_seconds).unwrap_or(i64::MAX / 1000);
        let expires_at = Utc::now() + Duration::seconds(ttl.min(i64::MAX / 1000));
        // A poisoned lock just means this entry is not cached.
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key.to_string(), CachedEntry { value, expires_at });
        }
    }
}

/// Return the cached value for `key`, or compute, cache and return it.
/// An entry that no longer deserialises is recomputed.
pub fn get_or_compute<T, F>(
    cache: &dyn ResultCache,
    key: &str,
    ttl_seconds: u64,
    compute: F,
) -> RiskResult<T>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> RiskResult<T>,
{
    if let Some(raw) = cache.get(key) {
        match serde_json::from_str(&raw) {
            Ok(value) => {
                log::debug!("Cache hit: {key}");
                return Ok(value);
            }
            Err(e) => log::debug!("Discarding unreadable cache entry {key}: {e}"),
        }
    }

    let value = compute()?;
    cache.set(key, serde_json::to_string(&value)?, ttl_seconds);
    Ok(value)
}
