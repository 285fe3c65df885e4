//! Process-wide application context.

use std::sync::Arc;

use hostwatch_adapters::prometheus::PrometheusClient;
use hostwatch_adapters::QueryError;
use tracing::info;

use crate::broadcast::SubscriberRegistry;
use crate::cache::{CacheStore, MemoryCache, RedisCache};
use crate::config::{CacheBackend, Settings};
use crate::fetcher::Fetcher;
use crate::queries::default_queries;
use crate::supervisor::StopSignal;

/// Everything the loops and HTTP handlers share, built once at startup and
/// passed explicitly.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub settings: Arc<Settings>,
    pub fetcher: Fetcher,
    pub cache: Arc<dyn CacheStore>,
    pub subscribers: SubscriberRegistry,
    pub stop: StopSignal,
}

impl AppContext {
    pub fn new(
        settings: Settings,
        fetcher: Fetcher,
        cache: Arc<dyn CacheStore>,
        stop: StopSignal,
    ) -> Self {
        let subscribers = SubscriberRegistry::new(settings.server.max_subscribers);
        Self {
            settings: Arc::new(settings),
            fetcher,
            cache,
            subscribers,
            stop,
        }
    }

    /// Build the backend client and cache store described by `settings`.
    ///
    /// The cache connects lazily, so this does no network I/O.
    pub fn from_settings(settings: Settings, stop: StopSignal) -> Result<Self, QueryError> {
        let client = PrometheusClient::builder()
            .endpoint(&settings.prometheus.url)
            .timeout(settings.prometheus.timeout)
            .max_connections(settings.prometheus.max_connections)
            .max_idle_connections(settings.prometheus.max_idle_connections)
            .retry(settings.retry_policy())
            .build()?;
        info!("Querying {}", client.query_url());

        let fetcher = Fetcher::new(Arc::new(client), default_queries());
        let cache = cache_store(&settings);
        Ok(Self::new(settings, fetcher, cache, stop))
    }
}

fn cache_store(settings: &Settings) -> Arc<dyn CacheStore> {
    match settings.cache.backend {
        CacheBackend::Redis => {
            let url = settings.cache.url.clone().unwrap_or_default();
            Arc::new(RedisCache::new(url).with_timeout(settings.cache.timeout))
        }
        CacheBackend::Memory => {
            info!("Using in-process cache");
            Arc::new(MemoryCache::new())
        }
    }
}
