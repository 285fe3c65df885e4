//! One full collection cycle over a set of named queries.
//!
//! The [`Fetcher`] resolves each requested name against the
//! [`QueryRegistry`], queries the backend, normalizes the series and
//! assembles a [`FetchResult`]. Per-metric failures are recorded in the
//! result rather than returned, so a cycle always yields an entry for every
//! requested name.

use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use hostwatch_adapters::prometheus::{format_all, PrometheusClient};
use hostwatch_adapters::QueryError;
use hostwatch_types::{FetchResult, MetricOutcome, RawSeriesPoint, METRIC_NOT_FOUND};
use tracing::{debug, warn};

use crate::queries::QueryRegistry;

/// Set of full `host:port` instance identifiers to keep.
pub type HostFilter = HashSet<String>;

/// Parse a comma-separated instance list.
///
/// Blank entries are ignored; an empty or blank list yields `None` (no
/// filtering).
pub fn parse_instance_filter(raw: &str) -> Option<HostFilter> {
    let filter: HostFilter = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    (!filter.is_empty()).then_some(filter)
}

/// Anything that can answer an instant query with raw series.
#[async_trait]
pub trait MetricSource: Send + Sync + Debug {
    async fn fetch_series(&self, expression: &str) -> Result<Vec<RawSeriesPoint>, QueryError>;
}

#[async_trait]
impl MetricSource for PrometheusClient {
    async fn fetch_series(&self, expression: &str) -> Result<Vec<RawSeriesPoint>, QueryError> {
        self.query_series(expression).await
    }
}

/// Runs collection cycles against a metric source.
#[derive(Debug, Clone)]
pub struct Fetcher {
    source: Arc<dyn MetricSource>,
    queries: Arc<QueryRegistry>,
}

impl Fetcher {
    pub fn new(source: Arc<dyn MetricSource>, queries: QueryRegistry) -> Self {
        Self {
            source,
            queries: Arc::new(queries),
        }
    }

    /// The registry this fetcher resolves names against.
    pub fn queries(&self) -> &QueryRegistry {
        &self.queries
    }

    /// Collect the named metrics, optionally keeping only the given instances.
    ///
    /// Queries for different names run concurrently. The returned map holds
    /// exactly the requested names.
    pub async fn collect<S: AsRef<str>>(
        &self,
        names: &[S],
        filter: Option<&HostFilter>,
    ) -> FetchResult {
        let cycles = names.iter().map(|name| async move {
            let name = name.as_ref();
            (name.to_string(), self.collect_one(name, filter).await)
        });

        let result: FetchResult = join_all(cycles).await.into_iter().collect();
        debug!(
            "Collected {} metrics ({} failed)",
            result.len(),
            result.error_count()
        );
        result
    }

    /// Collect every registered metric.
    pub async fn collect_all(&self, filter: Option<&HostFilter>) -> FetchResult {
        let names = self.queries.names();
        self.collect(names.as_slice(), filter).await
    }

    async fn collect_one(&self, name: &str, filter: Option<&HostFilter>) -> MetricOutcome {
        let Some(expression) = self.queries.expression(name) else {
            warn!("Requested unknown metric '{}'", name);
            return MetricOutcome::error(METRIC_NOT_FOUND);
        };

        match self.source.fetch_series(expression).await {
            Ok(points) => {
                let mut records = format_all(&points);
                if let Some(filter) = filter {
                    records.retain(|r| {
                        r.instance
                            .as_deref()
                            .is_some_and(|instance| filter.contains(instance))
                    });
                }
                MetricOutcome::Records(records)
            }
            Err(e) => {
                warn!("Query for '{}' failed: {}", name, e);
                MetricOutcome::error(e.to_string())
            }
        }
    }
}
