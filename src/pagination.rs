//! Pagination cache for text-search queries
//!
//! Each distinct `Query` gets one `CacheEntry` holding every result
//! reported so far and where the server stopped. Re-running a query replays
//! the stored results and then resumes from the stored cursor, so "load
//! more" costs one request for the new page only.
//!
//! Entries are kept for the life of the cache. With `CachePolicy::Unbounded`
//! (the default) memory grows with every distinct query issued; set a
//! capacity to evict least-recently-used queries instead.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;

use crate::models::SearchResult;

/// Where a paginated query should continue from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ResumeState {
    /// Never fetched; start from the beginning
    #[default]
    Start,
    /// The server stopped early and handed out this cursor
    After(String),
    /// The server finished; nothing more to fetch
    Exhausted,
    /// The last fetch ended without a footer, failed or was cancelled
    Crashed,
}

/// Accumulated state of one query
#[derive(Debug, Clone, Default)]
pub struct CacheEntry {
    pub resume: ResumeState,
    /// Sticky: set once any page reported server-side errors
    pub has_errored: bool,
    /// Every result reported so far, in report order
    pub results: Vec<SearchResult>,
}

/// Eviction policy for `SearchCache`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    Unbounded,
    Lru(NonZeroUsize),
}

/// Query-keyed store of `CacheEntry`s
///
/// Entries are handed out behind an async mutex. Holding it for a whole
/// execution serializes concurrent runs of the same query while runs of
/// different queries proceed independently.
pub struct SearchCache {
    entries: Mutex<LruCache<String, Arc<AsyncMutex<CacheEntry>>>>,
}

impl SearchCache {
    pub fn new(policy: CachePolicy) -> Self {
        let entries = match policy {
            CachePolicy::Unbounded => LruCache::unbounded(),
            CachePolicy::Lru(capacity) => LruCache::new(capacity),
        };
        Self {
            entries: Mutex::new(entries),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(CachePolicy::Unbounded)
    }

    /// Entry for `key`, created empty if absent
    pub fn entry(&self, key: &str) -> Arc<AsyncMutex<CacheEntry>> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = entries.get(key) {
            return Arc::clone(entry);
        }
        log::debug!("New cache entry for {}", key);
        let entry = Arc::new(AsyncMutex::new(CacheEntry::default()));
        if let Some((evicted, _)) = entries.push(key.to_string(), Arc::clone(&entry)) {
            if evicted != key {
                log::debug!("Evicted cache entry for {}", evicted);
            }
        }
        entry
    }

    /// Entry for `key` if present, without touching recency
    pub fn peek(&self, key: &str) -> Option<Arc<AsyncMutex<CacheEntry>>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.peek(key).cloned()
    }

    /// Forget `key`; the next execution starts from scratch
    pub fn remove(&self, key: &str) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.pop(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SearchCache {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl std::fmt::Debug for SearchCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchCache").field("len", &self.len()).finish()
    }
}
