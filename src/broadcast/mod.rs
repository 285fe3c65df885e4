//! Push loop serving cached snapshots to subscribers.
//!
//! Each connected subscriber gets its own loop: read both cached snapshots,
//! merge them into a [`BroadcastPayload`], push it, then wait one push
//! interval. Every step watches for shutdown, and every step that does not
//! hold the transport also watches for disconnect, so a slow cache cannot pin
//! a loop. The loop only reads the cache; it never queries the backend.

mod registry;
mod transport;

pub use registry::{RegistryFull, SubscriberGuard, SubscriberRegistry};
pub use transport::{ChannelTransport, SubscriberTransport, TransportError, WebSocketTransport};

use std::sync::Arc;
use std::time::Duration;

use hostwatch_types::{BroadcastPayload, FetchResult};
use tracing::{debug, info, warn};

use crate::cache::{load_json, CacheStore, METRICS_KEY, STATUS_KEY};
use crate::queries::STATUS;
use crate::supervisor::StopSignal;

/// Why a subscriber loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriberExit {
    /// The peer went away.
    Disconnected,
    /// A push failed.
    PushFailed(String),
    /// The service is shutting down.
    Stopped,
}

/// Read one cached snapshot, treating every failure as a miss.
async fn read_snapshot(cache: &dyn CacheStore, key: &str) -> Option<FetchResult> {
    match load_json(cache, key).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!("Ignoring unreadable snapshot '{}': {}", key, e);
            None
        }
    }
}

/// Build the payload from whatever is currently cached.
pub async fn build_payload(cache: &dyn CacheStore) -> BroadcastPayload {
    let status = read_snapshot(cache, STATUS_KEY).await;
    let metrics = read_snapshot(cache, METRICS_KEY).await;
    BroadcastPayload::merge(status, metrics, STATUS)
}

/// Serve one subscriber until it disconnects or the service stops.
///
/// The guard is held for the whole loop, so the subscriber is deregistered
/// on every exit path.
pub async fn run_subscriber<T: SubscriberTransport>(
    mut transport: T,
    guard: SubscriberGuard,
    cache: Arc<dyn CacheStore>,
    interval: Duration,
    stop: StopSignal,
) -> SubscriberExit {
    let id = guard.id();
    info!("Subscriber {} connected", id);

    let exit = loop {
        if stop.is_stopped() {
            break SubscriberExit::Stopped;
        }

        let payload = tokio::select! {
            payload = build_payload(cache.as_ref()) => payload,
            _ = transport.closed() => break SubscriberExit::Disconnected,
            _ = stop.stopped() => break SubscriberExit::Stopped,
        };

        let pushed = tokio::select! {
            pushed = transport.push(&payload) => pushed,
            _ = stop.stopped() => break SubscriberExit::Stopped,
        };
        if let Err(e) = pushed {
            break match e {
                TransportError::Closed => SubscriberExit::Disconnected,
                e => SubscriberExit::PushFailed(e.to_string()),
            };
        }
        debug!("Pushed snapshot to subscriber {}", id);

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = transport.closed() => break SubscriberExit::Disconnected,
            _ = stop.stopped() => break SubscriberExit::Stopped,
        }
    };

    drop(guard);
    info!("Subscriber {} finished: {:?}", id, exit);
    exit
}
