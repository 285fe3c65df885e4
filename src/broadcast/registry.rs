use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::watch;

/// Rejection when the subscriber cap is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Subscriber limit of {max} reached")]
pub struct RegistryFull {
    pub max: usize,
}

/// Set of currently connected push subscribers.
///
/// Each registration yields a [`SubscriberGuard`]; the subscriber stays
/// registered exactly as long as its guard is alive.
#[derive(Debug, Clone)]
pub struct SubscriberRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Debug)]
struct RegistryInner {
    next_id: AtomicU64,
    active: Mutex<BTreeSet<u64>>,
    max: Option<usize>,
    count_tx: watch::Sender<usize>,
}

impl SubscriberRegistry {
    /// Create a registry, optionally capped at `max` concurrent subscribers.
    pub fn new(max: Option<usize>) -> Self {
        let (count_tx, _) = watch::channel(0);
        Self {
            inner: Arc::new(RegistryInner {
                next_id: AtomicU64::new(1),
                active: Mutex::new(BTreeSet::new()),
                max,
                count_tx,
            }),
        }
    }

    /// Register a new subscriber.
    pub fn register(&self) -> Result<SubscriberGuard, RegistryFull> {
        let mut active = self.inner.active.lock();
        if let Some(max) = self.inner.max {
            if active.len() >= max {
                return Err(RegistryFull { max });
            }
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        active.insert(id);
        self.inner.count_tx.send_replace(active.len());

        Ok(SubscriberGuard {
            id,
            inner: self.inner.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.inner.active.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max(&self) -> Option<usize> {
        self.inner.max
    }

    /// Ids of the active subscribers, in registration order.
    pub fn ids(&self) -> Vec<u64> {
        self.inner.active.lock().iter().copied().collect()
    }

    /// Wait until no subscriber is registered. Returns `false` on timeout.
    pub async fn wait_idle(&self, grace: Duration) -> bool {
        let mut count_rx = self.inner.count_tx.subscribe();
        let idle = tokio::time::timeout(grace, count_rx.wait_for(|count| *count == 0)).await;
        matches!(idle, Ok(Ok(_)))
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Registration of one subscriber; dropping it deregisters.
#[derive(Debug)]
pub struct SubscriberGuard {
    id: u64,
    inner: Arc<RegistryInner>,
}

impl SubscriberGuard {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        let mut active = self.inner.active.lock();
        active.remove(&self.id);
        self.inner.count_tx.send_replace(active.len());
    }
}
