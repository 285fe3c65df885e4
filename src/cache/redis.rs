//! Redis-backed cache store.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use ::redis::aio::{ConnectionManager, ConnectionManagerConfig};
use ::redis::AsyncCommands;
use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::info;

use super::{CacheError, CacheStore};

/// Bound on connecting and on each command when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Cache store backed by a Redis server.
///
/// The connection is opened on first use and shared for the lifetime of the
/// store. Initialization runs at most once at a time: concurrent first
/// callers wait on the same attempt, and a failed attempt is retried by the
/// next caller. The multiplexed connection reconnects on its own afterwards.
///
/// Every operation, including the first connect, finishes within the
/// configured timeout or fails with [`CacheError::Timeout`].
pub struct RedisCache {
    url: String,
    timeout: Duration,
    connection: OnceCell<ConnectionManager>,
}

impl RedisCache {
    /// Create a store for the given URL (e.g. `redis://localhost:6379/0`).
    ///
    /// No connection is made until the first command.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: DEFAULT_TIMEOUT,
            connection: OnceCell::new(),
        }
    }

    /// Set the bound on connecting and on each command.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether the connection has been established.
    pub fn is_connected(&self) -> bool {
        self.connection.initialized()
    }

    async fn connection(&self) -> Result<ConnectionManager, CacheError> {
        let connection = self
            .connection
            .get_or_try_init(|| async {
                let client = ::redis::Client::open(self.url.as_str())
                    .map_err(|e| CacheError::Connect(e.to_string()))?;
                let config = ConnectionManagerConfig::new()
                    .set_connection_timeout(self.timeout)
                    .set_response_timeout(self.timeout);
                let manager = ConnectionManager::new_with_config(client, config)
                    .await
                    .map_err(|e| CacheError::Connect(e.to_string()))?;
                info!("Connected to cache");
                Ok::<_, CacheError>(manager)
            })
            .await?;
        Ok(connection.clone())
    }

    /// Run `op` under the store timeout.
    async fn bounded<T, F>(&self, op: F) -> Result<T, CacheError>
    where
        F: Future<Output = Result<T, CacheError>>,
    {
        tokio::time::timeout(self.timeout, op)
            .await
            .map_err(|_| CacheError::Timeout(self.timeout))?
    }
}

impl fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCache")
            .field("timeout", &self.timeout)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Redis expiry granularity is whole seconds; round up and never go below one.
fn ttl_seconds(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}

fn command_error(err: ::redis::RedisError) -> CacheError {
    CacheError::Command(err.to_string())
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let secs = ttl_seconds(ttl);
        self.bounded(async {
            let mut conn = self.connection().await?;
            ::redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("EX")
                .arg(secs)
                .query_async(&mut conn)
                .await
                .map_err(command_error)
        })
        .await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.bounded(async {
            let mut conn = self.connection().await?;
            conn.get(key).await.map_err(command_error)
        })
        .await
    }
}
