//! HTTP and WebSocket surface.

use std::collections::BTreeSet;
use std::future::Future;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use hostwatch_types::{host_of, FetchResult};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::broadcast::{run_subscriber, WebSocketTransport};
use crate::context::AppContext;
use crate::fetcher::parse_instance_filter;
use crate::queries::STATUS;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstancesResponse {
    pub instances: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostsResponse {
    pub hosts: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MetricsParams {
    /// Comma-separated `host:port` list.
    pub instances: Option<String>,
}

/// All routes, with request tracing.
pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route("/ws/metrics", get(ws_metrics))
        .route("/prometheus/instances", get(instances))
        .route("/prometheus/hosts", get(hosts))
        .route("/prometheus/metrics", get(metrics))
        .route("/health", get(health))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, ctx: AppContext, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn ws_metrics(State(ctx): State<AppContext>, ws: WebSocketUpgrade) -> Response {
    let guard = match ctx.subscribers.register() {
        Ok(guard) => guard,
        Err(full) => {
            warn!("Rejecting subscriber: {}", full);
            return (StatusCode::SERVICE_UNAVAILABLE, full.to_string()).into_response();
        }
    };

    ws.on_upgrade(move |socket| async move {
        run_subscriber(
            WebSocketTransport::new(socket),
            guard,
            ctx.cache.clone(),
            ctx.settings.intervals.push,
            ctx.stop.clone(),
        )
        .await;
    })
}

/// Unique instance ids from a live status fetch. A failed fetch yields none.
async fn live_instances(ctx: &AppContext) -> BTreeSet<String> {
    let status = ctx.fetcher.collect(&[STATUS], None).await;
    let Some(outcome) = status.get(STATUS) else {
        return BTreeSet::new();
    };

    if let Some(error) = outcome.error_message() {
        warn!("Instance lookup failed: {}", error);
    }
    outcome
        .records()
        .unwrap_or_default()
        .iter()
        .filter_map(|record| record.instance.clone())
        .collect()
}

async fn instances(State(ctx): State<AppContext>) -> Json<InstancesResponse> {
    let instances = live_instances(&ctx).await.into_iter().collect();
    Json(InstancesResponse { instances })
}

async fn hosts(State(ctx): State<AppContext>) -> Json<HostsResponse> {
    let hosts: BTreeSet<String> = live_instances(&ctx)
        .await
        .iter()
        .map(|instance| host_of(instance).to_string())
        .collect();
    Json(HostsResponse {
        hosts: hosts.into_iter().collect(),
    })
}

async fn metrics(
    State(ctx): State<AppContext>,
    Query(params): Query<MetricsParams>,
) -> Json<FetchResult> {
    let filter = params.instances.as_deref().and_then(parse_instance_filter);
    Json(ctx.fetcher.collect_all(filter.as_ref()).await)
}

async fn health() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use hostwatch_types::MetricOutcome;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tower::ServiceExt;

    use super::*;
    use crate::cache::{CacheStore, MemoryCache};
    use crate::config::Settings;
    use crate::fetcher::tests::{point, Reply, StubSource};
    use crate::fetcher::Fetcher;
    use crate::queries::{default_queries, CPU_USAGE};
    use crate::supervisor::{stop_channel, StopHandle};

    fn context(source: StubSource, settings: Settings) -> (StopHandle, AppContext) {
        let (handle, stop) = stop_channel();
        let fetcher = Fetcher::new(Arc::new(source), default_queries());
        let cache: Arc<dyn CacheStore> = Arc::new(MemoryCache::new());
        (handle, AppContext::new(settings, fetcher, cache, stop))
    }

    fn three_hosts() -> StubSource {
        StubSource::new().reply(
            "up",
            Reply::Points(vec![
                point("web2:9100", "1"),
                point("web1:9100", "1"),
                point("web1:9200", "0"),
            ]),
        )
    }

    async fn get_body(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (_stop, ctx) = context(StubSource::new(), Settings::for_tests("http://stub"));
        let (status, body) = get_body(router(ctx), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");
    }

    #[tokio::test]
    async fn test_instances_are_unique_and_sorted() {
        let (_stop, ctx) = context(three_hosts(), Settings::for_tests("http://stub"));
        let (status, body) = get_body(router(ctx), "/prometheus/instances").await;
        assert_eq!(status, StatusCode::OK);

        let parsed: InstancesResponse = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed.instances, vec!["web1:9100", "web1:9200", "web2:9100"]);
    }

    #[tokio::test]
    async fn test_hosts_strip_ports() {
        let (_stop, ctx) = context(three_hosts(), Settings::for_tests("http://stub"));
        let (_, body) = get_body(router(ctx), "/prometheus/hosts").await;

        let parsed: HostsResponse = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed.hosts, vec!["web1", "web2"]);
    }

    #[tokio::test]
    async fn test_instances_empty_when_backend_down() {
        let (_stop, ctx) = context(StubSource::new(), Settings::for_tests("http://stub"));
        let (status, body) = get_body(router(ctx), "/prometheus/instances").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"{"instances":[]}"#);
    }

    #[tokio::test]
    async fn test_metrics_filtered_by_instances() {
        let source = three_hosts().reply(
            default_queries().expression(CPU_USAGE).unwrap(),
            Reply::Points(vec![point("web1:9100", "12.5"), point("web2:9100", "80")]),
        );
        let (_stop, ctx) = context(source, Settings::for_tests("http://stub"));
        let (status, body) =
            get_body(router(ctx), "/prometheus/metrics?instances=web2:9100,").await;
        assert_eq!(status, StatusCode::OK);

        let result: FetchResult = serde_json::from_str(&body).unwrap();
        assert_eq!(result.len(), 4);
        let cpu = result.get(CPU_USAGE).unwrap().records().unwrap();
        assert_eq!(cpu.len(), 1);
        assert_eq!(cpu[0].value, Some(80.0));
        assert!(matches!(result.get("memory_usage"), Some(MetricOutcome::Failed { .. })));
    }

    #[tokio::test]
    async fn test_metrics_without_filter() {
        let (_stop, ctx) = context(three_hosts(), Settings::for_tests("http://stub"));
        let (_, body) = get_body(router(ctx), "/prometheus/metrics").await;

        let result: FetchResult = serde_json::from_str(&body).unwrap();
        assert_eq!(result.get(STATUS).unwrap().records().unwrap().len(), 3);
    }

    const UPGRADE: &str = "GET /ws/metrics HTTP/1.1\r\n\
        Host: localhost\r\n\
        Connection: Upgrade\r\n\
        Upgrade: websocket\r\n\
        Sec-WebSocket-Version: 13\r\n\
        Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n";

    async fn spawn_server(ctx: AppContext) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(ctx)).await.unwrap();
        });
        addr
    }

    /// Send the upgrade request and return the status line.
    async fn upgrade(stream: &mut TcpStream) -> String {
        stream.write_all(UPGRADE.as_bytes()).await.unwrap();

        let mut head = Vec::new();
        let mut byte = [0u8; 1];
        while !head.ends_with(b"\r\n\r\n") {
            stream.read_exact(&mut byte).await.unwrap();
            head.push(byte[0]);
        }
        let head = String::from_utf8(head).unwrap();
        head.lines().next().unwrap_or_default().to_string()
    }

    /// Read one unmasked server text frame.
    async fn read_text_frame(stream: &mut TcpStream) -> String {
        let mut header = [0u8; 2];
        stream.read_exact(&mut header).await.unwrap();
        assert_eq!(header[0], 0x81, "expected a final text frame");

        let len = match header[1] & 0x7f {
            126 => {
                let mut ext = [0u8; 2];
                stream.read_exact(&mut ext).await.unwrap();
                u16::from_be_bytes(ext) as usize
            }
            127 => {
                let mut ext = [0u8; 8];
                stream.read_exact(&mut ext).await.unwrap();
                u64::from_be_bytes(ext) as usize
            }
            n => n as usize,
        };

        let mut payload = vec![0u8; len];
        stream.read_exact(&mut payload).await.unwrap();
        String::from_utf8(payload).unwrap()
    }

    #[tokio::test]
    async fn test_websocket_push_cap_and_disconnect() {
        let mut settings = Settings::for_tests("http://stub");
        settings.server.max_subscribers = Some(1);
        settings.intervals.push = Duration::from_millis(100);
        let (_stop, ctx) = context(StubSource::new(), settings);
        let subscribers = ctx.subscribers.clone();
        let addr = spawn_server(ctx).await;

        let mut first = TcpStream::connect(addr).await.unwrap();
        assert!(upgrade(&mut first).await.starts_with("HTTP/1.1 101"));
        assert_eq!(
            read_text_frame(&mut first).await,
            r#"{"statuses":[],"metrics":{}}"#
        );
        assert_eq!(
            read_text_frame(&mut first).await,
            r#"{"statuses":[],"metrics":{}}"#
        );
        assert_eq!(subscribers.len(), 1);

        let mut second = TcpStream::connect(addr).await.unwrap();
        assert!(upgrade(&mut second).await.starts_with("HTTP/1.1 503"));

        drop(first);
        assert!(subscribers.wait_idle(Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_websocket_loop_ends_on_stop() {
        let mut settings = Settings::for_tests("http://stub");
        settings.intervals.push = Duration::from_secs(60);
        let (stop, ctx) = context(StubSource::new(), settings);
        let subscribers = ctx.subscribers.clone();
        let addr = spawn_server(ctx).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        assert!(upgrade(&mut stream).await.starts_with("HTTP/1.1 101"));
        read_text_frame(&mut stream).await;
        assert_eq!(subscribers.len(), 1);

        stop.stop();
        assert!(subscribers.wait_idle(Duration::from_secs(2)).await);
    }
}
