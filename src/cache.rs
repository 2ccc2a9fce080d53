use std::{collections::HashMap, time::Duration};

use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Short-lived de-duplication cache for idempotent backend reads.
///
/// Entries live for a fixed TTL from insertion and are never refreshed in
/// place; there is no size bound.
#[derive(Debug)]
pub struct RequestCache {
    ttl: Duration,
    entries: HashMap<String, CacheEntry>,
}

impl Default for RequestCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

impl RequestCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// `"<operation>_<url>"`
    pub fn key(operation: &str, url: &str) -> String {
        format!("{operation}_{url}")
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| &entry.value)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        let now = Instant::now();
        self.purge_expired(now);
        self.entries.insert(
            key.into(),
            CacheEntry {
                value,
                expires_at: now + self.ttl,
            },
        );
    }

    fn purge_expired(&mut self, now: Instant) {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let dropped = before - self.entries.len();
        if dropped > 0 {
            debug!("Cache: {dropped} entrada(s) expirada(s) eliminada(s)");
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
