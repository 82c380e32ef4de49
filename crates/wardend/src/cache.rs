//! Per-domain identity cache boundary.
//!
//! The broker opens one cache per domain at startup and hands lookups the
//! backend resolves to it. Persistence is a collaborator concern; the
//! in-memory implementation here is the process-local store the rest of the
//! daemon programs against.

use std::collections::HashMap;

use tracing::debug;

/// Tracing target for cache activity.
const CACHE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::cache");

/// Identity cache opened for one domain.
pub trait IdentityCache {
    /// Domain the cache belongs to.
    fn domain(&self) -> &str;

    /// Stores or replaces one cached entry.
    fn store_entry(&mut self, key: &str, value: serde_json::Value);

    /// Looks up one cached entry.
    fn lookup_entry(&self, key: &str) -> Option<&serde_json::Value>;

    /// Number of cached entries.
    fn len(&self) -> usize;

    /// Whether the cache holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-local identity cache.
#[derive(Debug)]
pub struct MemoryCache {
    domain: String,
    entries: HashMap<String, serde_json::Value>,
}

impl MemoryCache {
    /// Opens an empty cache for the given domain.
    #[must_use]
    pub fn open(domain: impl Into<String>) -> Self {
        let domain = domain.into();
        debug!(target: CACHE_TARGET, %domain, "opened identity cache");
        Self {
            domain,
            entries: HashMap::new(),
        }
    }
}

impl IdentityCache for MemoryCache {
    fn domain(&self) -> &str {
        &self.domain
    }

    fn store_entry(&mut self, key: &str, value: serde_json::Value) {
        self.entries.insert(key.to_owned(), value);
    }

    fn lookup_entry(&self, key: &str) -> Option<&serde_json::Value> {
        self.entries.get(key)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
