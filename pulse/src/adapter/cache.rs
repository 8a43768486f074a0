use std::collections::HashMap;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

/// Last known response for one cache key.
///
/// Replaced wholesale on every successful refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheEntry {
    pub key: String,
    pub etag: Option<String>,
    pub body: String,
    pub fetched_at_ms: u64,
    pub ttl_secs: u64,
    /// Set when the TTL elapsed and a refresh failed or was blocked.
    pub stale: bool,
}

impl CacheEntry {
    pub fn is_fresh(&self, now_ms: u64) -> bool {
        now_ms < self.fetched_at_ms.saturating_add(self.ttl_secs.saturating_mul(1_000))
    }
}

/// In-process ETag-aware response cache, keyed by feed cache key.
#[derive(Default)]
pub struct ResponseCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.entries.lock().get(key).cloned()
    }

    pub fn put(&self, entry: CacheEntry) {
        debug!(key = %entry.key, etag = ?entry.etag, "cache entry replaced");
        self.entries.lock().insert(entry.key.clone(), entry);
    }

    /// `304 Not Modified`: the cached body is current again.
    pub fn touch(&self, key: &str, now_ms: u64) -> Option<CacheEntry> {
        let mut entries = self.entries.lock();
        let e = entries.get_mut(key)?;
        e.fetched_at_ms = now_ms;
        e.stale = false;
        Some(e.clone())
    }

    /// Flags the entry as stale and returns it, if one exists.
    pub fn mark_stale(&self, key: &str) -> Option<CacheEntry> {
        let mut entries = self.entries.lock();
        let e = entries.get_mut(key)?;
        e.stale = true;
        Some(e.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
