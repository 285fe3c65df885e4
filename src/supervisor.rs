//! Ownership and lifecycle of background tasks.
//!
//! Every long-running loop is started through [`Supervisor::supervise`]. The
//! supervisor restarts a task that panics, and on [`Supervisor::shutdown`]
//! broadcasts a stop signal, gives tasks a bounded grace period to finish,
//! and aborts whatever is still running.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::SupervisorSettings;

/// Create a connected stop handle and signal.
pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (stop_tx, stop_rx) = watch::channel(false);
    (StopHandle { stop_tx }, StopSignal { stop_rx })
}

/// Sending side of the stop signal.
#[derive(Debug)]
pub struct StopHandle {
    stop_tx: watch::Sender<bool>,
}

impl StopHandle {
    /// Tell every signal holder to stop. Idempotent.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// A new signal observing this handle.
    pub fn signal(&self) -> StopSignal {
        StopSignal {
            stop_rx: self.stop_tx.subscribe(),
        }
    }
}

/// Cooperative cancellation observed by background loops.
///
/// Dropping the [`StopHandle`] counts as a stop.
#[derive(Debug, Clone)]
pub struct StopSignal {
    stop_rx: watch::Receiver<bool>,
}

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        *self.stop_rx.borrow()
    }

    /// Resolve once stop has been requested.
    pub async fn stopped(&self) {
        let mut stop_rx = self.stop_rx.clone();
        let _ = stop_rx.wait_for(|stopped| *stopped).await;
    }

    /// Sleep for `duration` unless stopped first. Returns `true` if stopped.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => self.is_stopped(),
            _ = self.stopped() => true,
        }
    }
}

/// Owns the background tasks of the service.
#[derive(Debug)]
pub struct Supervisor {
    stop: StopHandle,
    restart_delay: Duration,
    shutdown_grace: Duration,
    tasks: Mutex<Vec<(String, JoinHandle<()>)>>,
}

impl Supervisor {
    pub fn new(settings: &SupervisorSettings) -> Self {
        Self::with_timing(settings.restart_delay, settings.shutdown_grace)
    }

    pub fn with_timing(restart_delay: Duration, shutdown_grace: Duration) -> Self {
        let (stop, _) = stop_channel();
        Self {
            stop,
            restart_delay,
            shutdown_grace,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// The stop signal shared by every supervised task.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.signal()
    }

    /// Number of tasks started and not yet reaped by shutdown.
    pub fn task_count(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Run a task produced by `factory`, restarting it after a panic.
    ///
    /// The factory is called again for each restart. A task that returns
    /// normally is not restarted.
    pub fn supervise<F, Fut>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(StopSignal) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let stop = self.stop_signal();
        let restart_delay = self.restart_delay;
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            loop {
                let run = AssertUnwindSafe(factory(stop.clone())).catch_unwind().await;
                match run {
                    Ok(()) => {
                        debug!("Task '{}' finished", task_name);
                        break;
                    }
                    Err(panic) => {
                        error!("Task '{}' panicked: {}", task_name, panic_message(&*panic));
                    }
                }

                if stop.is_stopped() || stop.sleep(restart_delay).await {
                    break;
                }
                info!("Restarting task '{}'", task_name);
            }
        });

        self.tasks.lock().push((name, handle));
    }

    /// Stop every task, waiting at most the grace period before aborting.
    ///
    /// Returns the number of tasks that had to be aborted.
    pub async fn shutdown(&self) -> usize {
        info!("Stopping {} background tasks", self.task_count());
        self.stop.stop();

        let tasks = std::mem::take(&mut *self.tasks.lock());
        let deadline = Instant::now() + self.shutdown_grace;
        let mut aborted = 0;

        for (name, mut handle) in tasks {
            if tokio::time::timeout_at(deadline, &mut handle).await.is_err() {
                warn!("Task '{}' did not stop within the grace period; aborting", name);
                handle.abort();
                aborted += 1;
            }
        }
        aborted
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}
