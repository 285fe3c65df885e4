//! In-process cache store.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::{CacheError, CacheStore};

/// Cache store backed by a map in process memory.
///
/// Expiry is measured on the tokio clock, so it follows paused or advanced
/// time in tests. Expired entries are dropped on read, and every write purges
/// whatever else has expired, so keys that are never read again do not pile up.
///
/// ```
/// use std::time::Duration;
/// use hostwatch::cache::{CacheStore, MemoryCache};
///
/// # tokio_test::block_on(async {
/// let cache = MemoryCache::new();
/// cache.put("greeting", "hello", Duration::from_secs(5)).await.unwrap();
/// assert_eq!(cache.get("greeting").await.unwrap().as_deref(), Some("hello"));
/// # });
/// ```
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        let entry = Entry {
            value: value.to_string(),
            expires_at: now + ttl,
        };
        let mut entries = self.entries.lock();
        entries.retain(|_, e| e.expires_at > now);
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }
}
