//! Snapshot cache shared between the poll loops and the broadcast loops.
//!
//! Producers `put` a serialized [`FetchResult`](hostwatch_types::FetchResult)
//! under a per-class key with an expiry; consumers `get` it. Every entry
//! expires, so a stalled producer shows up as a cache miss instead of stale
//! data being served forever.
//!
//! Two implementations are provided:
//!
//! - [`RedisCache`]: the production store (`SET key value EX ttl` / `GET key`)
//! - [`MemoryCache`]: an in-process store with the same expiry semantics

mod memory;
mod redis;

pub use self::memory::MemoryCache;
pub use self::redis::RedisCache;

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Key holding the latest host status snapshot.
pub const STATUS_KEY: &str = "prometheus_metrics_cache";
/// Key holding the latest resource usage snapshot.
pub const METRICS_KEY: &str = "prometheus_other_metrics_cache";

/// Errors from the cache store. A missing key is not an error.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Could not establish a connection to the store.
    #[error("Cache connection failed: {0}")]
    Connect(String),

    /// The store rejected or failed a command.
    #[error("Cache command failed: {0}")]
    Command(String),

    /// A cached value could not be encoded or decoded.
    #[error("Cache value encoding failed: {0}")]
    Encode(String),

    /// The store did not answer in time.
    #[error("Cache operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Key/value store with mandatory per-key expiry.
#[async_trait]
pub trait CacheStore: Send + Sync + Debug {
    /// Store `value` under `key`, replacing any previous value atomically.
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Fetch the value under `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
}

/// Serialize `value` as JSON and store it.
pub async fn store_json<T>(
    cache: &dyn CacheStore,
    key: &str,
    value: &T,
    ttl: Duration,
) -> Result<(), CacheError>
where
    T: Serialize + ?Sized,
{
    let json = serde_json::to_string(value).map_err(|e| CacheError::Encode(e.to_string()))?;
    cache.put(key, &json, ttl).await
}

/// Fetch and deserialize a JSON value.
pub async fn load_json<T>(cache: &dyn CacheStore, key: &str) -> Result<Option<T>, CacheError>
where
    T: DeserializeOwned,
{
    match cache.get(key).await? {
        Some(json) => serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| CacheError::Encode(format!("{}: {}", key, e))),
        None => Ok(None),
    }
}
