//! Periodic refresh of cached snapshots.
//!
//! A [`PollLoop`] repeatedly collects a fixed set of metric classes and
//! stores the result under its cache key. Backend and cache outages are
//! logged and absorbed; only the stop signal ends the loop.

use std::sync::Arc;
use std::time::Duration;

use hostwatch_types::FetchResult;
use tracing::{debug, info, warn};

use crate::cache::{store_json, CacheStore, METRICS_KEY, STATUS_KEY};
use crate::config::duration::format_duration;
use crate::fetcher::Fetcher;
use crate::queries::{RESOURCE_METRICS, STATUS};
use crate::supervisor::StopSignal;

/// One periodically refreshed cache entry.
#[derive(Debug, Clone)]
pub struct PollLoop {
    name: String,
    cache_key: String,
    metrics: Vec<String>,
    interval: Duration,
}

impl PollLoop {
    pub fn new<S: Into<String>>(
        name: impl Into<String>,
        cache_key: impl Into<String>,
        metrics: impl IntoIterator<Item = S>,
        interval: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            cache_key: cache_key.into(),
            metrics: metrics.into_iter().map(Into::into).collect(),
            interval,
        }
    }

    /// Host up/down snapshot.
    pub fn host_status(interval: Duration) -> Self {
        Self::new("host_status", STATUS_KEY, [STATUS], interval)
    }

    /// CPU, memory and disk usage snapshot.
    pub fn resource_usage(interval: Duration) -> Self {
        Self::new("resource_usage", METRICS_KEY, RESOURCE_METRICS, interval)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    pub fn metrics(&self) -> &[String] {
        &self.metrics
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Collect once and store the result. Cache failures are logged only.
    pub async fn run_cycle(
        &self,
        fetcher: &Fetcher,
        cache: &dyn CacheStore,
        ttl: Duration,
    ) -> FetchResult {
        let result = fetcher.collect(self.metrics.as_slice(), None).await;

        match store_json(cache, &self.cache_key, &result, ttl).await {
            Ok(()) => debug!(
                "{}: cached {} metrics under '{}'",
                self.name,
                result.len(),
                self.cache_key
            ),
            Err(e) => warn!("{}: failed to cache snapshot: {}", self.name, e),
        }
        result
    }

    /// Run cycles until stopped, sleeping `interval` between them.
    pub async fn run(
        self,
        fetcher: Fetcher,
        cache: Arc<dyn CacheStore>,
        ttl: Duration,
        stop: StopSignal,
    ) {
        info!(
            "Starting {} poll loop every {}",
            self.name,
            format_duration(self.interval)
        );

        while !stop.is_stopped() {
            self.run_cycle(&fetcher, cache.as_ref(), ttl).await;
            if stop.sleep(self.interval).await {
                break;
            }
        }

        info!("{} poll loop stopped", self.name);
    }
}
