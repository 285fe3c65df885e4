//! Prometheus adapter using the HTTP query API.
//!
//! This adapter runs instant queries against `/api/v1/query`, which any
//! Prometheus-compatible server (Prometheus, Thanos, VictoriaMetrics, ...)
//! exposes.
//!
//! ## Failure handling
//!
//! - **4xx**: the request is malformed or rejected; returned immediately
//! - **5xx, connect errors, timeouts**: transient; retried per [`RetryPolicy`]
//! - **Undecodable body**: returned immediately
//!
//! When every attempt fails transiently the error is
//! [`QueryError::Exhausted`], carrying the URL and attempt count.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use hostwatch_adapters::prometheus::{PrometheusClient, RetryPolicy};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = PrometheusClient::builder()
//!         .endpoint("http://prometheus:9090")
//!         .timeout(Duration::from_secs(5))
//!         .retry(RetryPolicy::fixed(3, Duration::from_millis(500)))
//!         .build()?;
//!
//!     let response = client.query("up").await?;
//!     println!("{} series", response.into_series().len());
//!     Ok(())
//! }
//! ```

mod format;
mod retry;

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use hostwatch_types::RawSeriesPoint;

use crate::QueryError;

pub use format::{format_all, format_series};
pub use retry::{Backoff, RetryPolicy};

/// Client for the Prometheus instant query API.
///
/// Cloning is cheap: clones share the connection pool and the in-flight
/// request limit.
#[derive(Debug, Clone)]
pub struct PrometheusClient {
    client: Client,
    endpoint: String,
    retry: RetryPolicy,
    in_flight: Arc<Semaphore>,
}

impl PrometheusClient {
    /// Create a new builder for configuring the client.
    pub fn builder() -> PrometheusClientBuilder {
        PrometheusClientBuilder::default()
    }

    /// Base URL of the backend.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The retry policy applied to every query.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Full URL of the instant query endpoint.
    pub fn query_url(&self) -> String {
        format!("{}/api/v1/query", self.endpoint.trim_end_matches('/'))
    }

    /// Run an instant query.
    pub async fn query(&self, expression: &str) -> Result<QueryResponse, QueryError> {
        self.query_with_params(expression, &[]).await
    }

    /// Run an instant query with extra URL parameters (e.g. `time`).
    pub async fn query_with_params(
        &self,
        expression: &str,
        extra: &[(&str, &str)],
    ) -> Result<QueryResponse, QueryError> {
        let url = self.query_url();
        let mut params = Vec::with_capacity(extra.len() + 1);
        params.push(("query", expression));
        params.extend_from_slice(extra);

        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match self.attempt(&url, &params).await {
                Ok(response) => return Ok(response),
                Err(err) if !err.is_transient() => return Err(err),
                Err(err) => err,
            };

            match self.retry.next_delay(attempt) {
                Some(delay) => {
                    warn!(
                        "Query attempt {}/{} against {} failed: {}; retrying in {:?}",
                        attempt,
                        self.retry.attempts(),
                        url,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    return Err(QueryError::Exhausted {
                        target: url,
                        attempts: attempt,
                        last: Box::new(err),
                    })
                }
            }
        }
    }

    /// Run an instant query and return only the result series.
    pub async fn query_series(&self, expression: &str) -> Result<Vec<RawSeriesPoint>, QueryError> {
        Ok(self.query(expression).await?.into_series())
    }

    async fn attempt(
        &self,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<QueryResponse, QueryError> {
        let _permit = self
            .in_flight
            .acquire()
            .await
            .map_err(|_| QueryError::Network("connection pool closed".to_string()))?;

        let response = self.client.get(url).query(params).send().await?;
        let status = response.status();

        if status.is_client_error() {
            return Err(QueryError::ClientSide {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        if status.is_server_error() {
            return Err(QueryError::ServerSide {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body: QueryResponse = response.json().await?;
        debug!("Query against {} returned {} series", url, body.len());
        Ok(body)
    }
}

/// Builder for PrometheusClient.
#[derive(Debug, Default)]
pub struct PrometheusClientBuilder {
    endpoint: Option<String>,
    timeout: Option<Duration>,
    retry: Option<RetryPolicy>,
    max_connections: Option<usize>,
    max_idle_connections: Option<usize>,
}

impl PrometheusClientBuilder {
    /// Set the backend base URL (e.g., "http://localhost:9090").
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the per-request timeout (default: 5 seconds).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the retry policy (default: 3 attempts, 500ms apart).
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Set the maximum number of concurrent requests (default: 100).
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = Some(max);
        self
    }

    /// Set the maximum number of idle pooled connections (default: 20).
    pub fn max_idle_connections(mut self, max: usize) -> Self {
        self.max_idle_connections = Some(max);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<PrometheusClient, QueryError> {
        let timeout = self.timeout.unwrap_or(Duration::from_secs(5));
        let max_connections = self.max_connections.unwrap_or(100);
        if max_connections == 0 {
            return Err(QueryError::Config(
                "max_connections must be at least 1".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(self.max_idle_connections.unwrap_or(20))
            .build()
            .map_err(|e| QueryError::Config(e.to_string()))?;

        Ok(PrometheusClient {
            client,
            endpoint: self
                .endpoint
                .unwrap_or_else(|| "http://localhost:9090".to_string()),
            retry: self.retry.unwrap_or_default(),
            in_flight: Arc::new(Semaphore::new(max_connections)),
        })
    }
}

/// Response envelope of the query API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub data: Option<QueryData>,
}

impl QueryResponse {
    /// Number of series in the result.
    pub fn len(&self) -> usize {
        self.data.as_ref().map_or(0, |d| d.result.len())
    }

    /// Check if the result is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consume the response, returning the result series.
    pub fn into_series(self) -> Vec<RawSeriesPoint> {
        self.data.map(|d| d.result).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryData {
    #[serde(default)]
    pub result: Vec<RawSeriesPoint>,
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;

    use super::*;
    use crate::ErrorKind;

    const UP_BODY: &str = r#"{"status":"success","data":{"resultType":"vector","result":[{"metric":{"instance":"h1:9090","job":"node"},"value":[1000,"1"]}]}}"#;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    /// Serve `/api/v1/query` locally. `respond` receives the 1-based hit count
    /// and the `query` parameter.
    async fn spawn_backend<F>(respond: F) -> (String, Arc<AtomicU32>)
    where
        F: Fn(u32, Option<String>) -> (StatusCode, String) + Clone + Send + Sync + 'static,
    {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();

        let app = Router::new().route(
            "/api/v1/query",
            get(move |Query(params): Query<HashMap<String, String>>| {
                let counter = counter.clone();
                let respond = respond.clone();
                async move {
                    let hit = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    respond(hit, params.get("query").cloned())
                }
            }),
        );

        (serve(app).await, hits)
    }

    fn client(endpoint: &str, attempts: u32) -> PrometheusClient {
        PrometheusClient::builder()
            .endpoint(endpoint)
            .timeout(Duration::from_millis(200))
            .retry(RetryPolicy::fixed(attempts, Duration::from_millis(10)))
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_defaults() {
        let client = PrometheusClient::builder().build().unwrap();
        assert_eq!(client.endpoint(), "http://localhost:9090");
        assert_eq!(client.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn test_builder_rejects_zero_connections() {
        let err = PrometheusClient::builder().max_connections(0).build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_query_url_trims_slash() {
        let client = PrometheusClient::builder()
            .endpoint("http://prom:9090/")
            .build()
            .unwrap();
        assert_eq!(client.query_url(), "http://prom:9090/api/v1/query");
    }

    #[test]
    fn test_response_envelope() {
        let response: QueryResponse = serde_json::from_str(UP_BODY).unwrap();
        assert_eq!(response.len(), 1);
        let series = response.into_series();
        assert_eq!(series[0].label("instance"), Some("h1:9090"));
    }

    #[test]
    fn test_response_without_data() {
        let response: QueryResponse = serde_json::from_str(r#"{"status":"success"}"#).unwrap();
        assert!(response.is_empty());
        assert!(response.into_series().is_empty());
    }

    #[tokio::test]
    async fn test_query_success_sends_expression() {
        let (endpoint, hits) = spawn_backend(|_, query| match query.as_deref() {
            Some("up") => (StatusCode::OK, UP_BODY.to_string()),
            _ => (StatusCode::BAD_REQUEST, "{}".to_string()),
        })
        .await;

        let series = client(&endpoint, 3).query_series("up").await.unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let (endpoint, hits) =
            spawn_backend(|_, _| (StatusCode::BAD_REQUEST, "bad query".to_string())).await;

        let err = client(&endpoint, 3).query("up{").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ClientSide);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_server_error_retried_until_exhausted() {
        let (endpoint, hits) =
            spawn_backend(|_, _| (StatusCode::SERVICE_UNAVAILABLE, String::new())).await;

        let err = client(&endpoint, 3).query("up").await.unwrap_err();
        match err {
            QueryError::Exhausted {
                target,
                attempts,
                last,
            } => {
                assert_eq!(target, format!("{}/api/v1/query", endpoint));
                assert_eq!(attempts, 3);
                assert_eq!(last.kind(), ErrorKind::ServerSide);
            }
            other => panic!("expected Exhausted, got {:?}", other),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_server_error_then_success() {
        let (endpoint, hits) = spawn_backend(|hit, _| {
            if hit == 1 {
                (StatusCode::INTERNAL_SERVER_ERROR, String::new())
            } else {
                (StatusCode::OK, UP_BODY.to_string())
            }
        })
        .await;

        let response = client(&endpoint, 3).query("up").await.unwrap();
        assert_eq!(response.len(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_timeout_retried_until_exhausted() {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/api/v1/query",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(800)).await;
                    (StatusCode::OK, UP_BODY)
                }
            }),
        );
        let endpoint = serve(app).await;

        let err = client(&endpoint, 2).query("up").await.unwrap_err();
        match err {
            QueryError::Exhausted { attempts, last, .. } => {
                assert_eq!(attempts, 2);
                assert_eq!(last.kind(), ErrorKind::Timeout);
            }
            other => panic!("expected Exhausted, got {:?}", other),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_connection_refused_is_transient() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(&format!("http://{}", addr), 2)
            .query("up")
            .await
            .unwrap_err();
        match err {
            QueryError::Exhausted { attempts, last, .. } => {
                assert_eq!(attempts, 2);
                assert_eq!(last.kind(), ErrorKind::Network);
            }
            other => panic!("expected Exhausted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_body_is_not_retried() {
        let (endpoint, hits) =
            spawn_backend(|_, _| (StatusCode::OK, "<html>not json</html>".to_string())).await;

        let err = client(&endpoint, 3).query("up").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
