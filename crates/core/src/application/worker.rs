// Worker - binds the queue to connectivity transitions and startup

use crate::application::queue::{FlushReport, QueueManager};
use crate::port::{ConnectivitySignal, SubmissionHandler};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

type FlushCallback = Arc<dyn Fn(&FlushReport) + Send + Sync>;

/// Drives flushes from app startup, online transitions, and an optional
/// poll tick.
///
/// Flushes run sequentially on one task, so at most one is in progress
/// per worker. A transition to online that arrives mid-flush is latched
/// by the connectivity channel and yields exactly one follow-up flush
/// after the current one completes; repeated transitions in that window
/// coalesce. The poll tick exists so backed-off items retry even when
/// the device never goes offline in between.
pub struct Worker {
    queue: Arc<QueueManager>,
    handler: Arc<dyn SubmissionHandler>,
    connectivity: ConnectivitySignal,
    poll_interval: Option<Duration>,
    on_flush: Option<FlushCallback>,
}

impl Worker {
    pub fn new(
        queue: Arc<QueueManager>,
        handler: Arc<dyn SubmissionHandler>,
        connectivity: ConnectivitySignal,
    ) -> Self {
        Self {
            queue,
            handler,
            connectivity,
            poll_interval: None,
            on_flush: None,
        }
    }

    /// Re-flush on a timer so backed-off items eventually retry while
    /// the device stays online
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Invoked after every flush with its report (pending-items badge)
    pub fn with_flush_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&FlushReport) + Send + Sync + 'static,
    {
        self.on_flush = Some(Arc::new(callback));
        self
    }

    /// Spawn the worker loop. One immediate flush covers items left over
    /// from a previous offline session.
    pub fn start(self) -> WorkerHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let join = tokio::spawn(self.run(stop_rx));
        WorkerHandle { stop_tx, join }
    }

    async fn run(self, mut stop_rx: watch::Receiver<bool>) {
        info!("Sync worker started");

        let mut signal = self.connectivity.clone();
        self.flush_once().await;

        loop {
            // A stop requested mid-flush takes effect here, without
            // cancelling the flush that was in progress
            if *stop_rx.borrow() {
                break;
            }

            tokio::select! {
                _ = signal.wait_for_online() => {
                    self.flush_once().await;
                }
                _ = poll_tick(self.poll_interval) => {
                    self.flush_once().await;
                }
                _ = stop_rx.changed() => {}
            }
        }

        info!("Sync worker stopped");
    }

    async fn flush_once(&self) {
        match self.queue.flush(Arc::clone(&self.handler)).await {
            Ok(report) => {
                if let Some(callback) = &self.on_flush {
                    callback(&report);
                }
            }
            Err(e) => {
                // Storage trouble; the next trigger will try again
                error!(error = %e, "Flush failed");
            }
        }
    }
}

async fn poll_tick(interval: Option<Duration>) {
    match interval {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending().await,
    }
}

/// Handle returned by [`Worker::start`]
pub struct WorkerHandle {
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Prevent future automatic flushes. An in-flight flush is not
    /// cancelled; it completes and the loop then exits.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Wait for the worker loop to exit
    pub async fn stopped(self) {
        let _ = self.join.await;
    }
}
