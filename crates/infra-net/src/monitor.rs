// Connectivity Monitor - periodic reachability probe

use fieldsync_core::port::ConnectivityPublisher;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Probe configuration
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// host:port the probe connects to
    pub probe_addr: String,
    /// Time between probes
    pub interval: Duration,
    /// Per-probe connect timeout
    pub probe_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            probe_addr: "1.1.1.1:443".to_string(),
            interval: Duration::from_secs(15),
            probe_timeout: Duration::from_secs(3),
        }
    }
}

/// Drives the connectivity signal from periodic TCP connect attempts.
///
/// A successful connect reports online, anything else offline. This is
/// only a reachability hint for the probe target, not the backend: the
/// submission path still treats a network failure at call time as an
/// ordinary delivery failure.
pub struct ConnectivityMonitor {
    config: MonitorConfig,
    publisher: ConnectivityPublisher,
}

impl ConnectivityMonitor {
    pub fn new(config: MonitorConfig, publisher: ConnectivityPublisher) -> Self {
        Self { config, publisher }
    }

    /// Spawn the probe loop. The first probe fires immediately.
    pub fn start(self) -> MonitorHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let join = tokio::spawn(self.run(stop_rx));
        MonitorHandle { stop_tx, join }
    }

    async fn run(self, mut stop_rx: watch::Receiver<bool>) {
        info!(
            probe_addr = %self.config.probe_addr,
            interval_ms = %self.config.interval.as_millis(),
            "Connectivity monitor started"
        );

        let mut tick = tokio::time::interval(self.config.interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut last_reported: Option<bool> = None;

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let online = self.probe_once().await;
                    if last_reported != Some(online) {
                        if online {
                            info!("Connectivity restored");
                        } else {
                            warn!(probe_addr = %self.config.probe_addr, "Connectivity lost");
                        }
                        last_reported = Some(online);
                    }
                    self.publisher.set_online(online);
                }
                _ = stop_rx.changed() => {
                    if *stop_rx.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Connectivity monitor stopped");
    }

    async fn probe_once(&self) -> bool {
        let connect = TcpStream::connect(&self.config.probe_addr);
        match tokio::time::timeout(self.config.probe_timeout, connect).await {
            Ok(Ok(_stream)) => true,
            Ok(Err(e)) => {
                debug!(probe_addr = %self.config.probe_addr, error = %e, "Probe failed");
                false
            }
            Err(_) => {
                debug!(probe_addr = %self.config.probe_addr, "Probe timed out");
                false
            }
        }
    }
}

/// Handle returned by [`ConnectivityMonitor::start`]
pub struct MonitorHandle {
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    pub async fn stopped(self) {
        let _ = self.join.await;
    }
}
