//! Auto-Match Cache
//!
//! Remembers which message type a full auto-match picked for an endpoint, so
//! repeated traffic to the same path skips the scan. Keys look like
//! `response:https://host/path`; the query string never takes part.
//!
//! Entries are tied to the descriptor-set generation they were matched
//! against. A lookup under a different generation misses, and the first write
//! under a new generation drops everything older.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::schema::Direction;

/// Build the cache key for a URL seen in one direction.
///
/// Everything from the first `?` (or `#`) on is dropped; scheme, host and
/// path are kept verbatim.
pub fn auto_cache_key(url: &str, direction: Direction) -> String {
    let end = url.find(|c: char| c == '?' || c == '#').unwrap_or(url.len());
    format!("{}:{}", direction.as_str(), &url[..end])
}

#[derive(Debug, Default)]
struct CacheInner {
    generation: u64,
    entries: HashMap<String, String>,
}

/// Thread-safe memo of key -> message type name
#[derive(Debug, Default)]
pub struct AutoMatchCache {
    inner: RwLock<CacheInner>,
}

impl AutoMatchCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached type for `key`, if it was stored under `generation`
    pub fn get(&self, key: &str, generation: u64) -> Option<String> {
        let inner = self.inner.read();
        if inner.generation != generation {
            return None;
        }
        inner.entries.get(key).cloned()
    }

    /// Store or overwrite the type for `key`
    pub fn insert(&self, key: impl Into<String>, type_name: impl Into<String>, generation: u64) {
        let mut inner = self.inner.write();
        if inner.generation != generation {
            inner.entries.clear();
            inner.generation = generation;
        }
        inner.entries.insert(key.into(), type_name.into());
    }

    /// Drop one entry; used when a cached type stops decoding
    pub fn remove(&self, key: &str) {
        self.inner.write().entries.remove(key);
    }

    pub fn clear(&self) {
        self.inner.write().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
