//! Fieldsync Agent - Main Entry Point
//!
//! Composition root wiring the queue to its SQLite store, connectivity
//! probe, HTTP delivery, and spool ingestion.

mod spool;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Import workspace crates
use fieldsync_core::application::{BackoffPolicy, QueueManager, Worker};
use fieldsync_core::port::connectivity_channel;
use fieldsync_core::port::id_provider::UuidProvider;
use fieldsync_core::port::time_provider::SystemTimeProvider;
use fieldsync_infra_http::{HttpHandlerConfig, HttpSubmissionHandler};
use fieldsync_infra_net::{ConnectivityMonitor, MonitorConfig};
use fieldsync_infra_sqlite::{create_pool, run_migrations, SqliteRecordStore};

use spool::{SpoolConfig, SpoolIngest};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_DB_PATH: &str = "~/.fieldsync/queue.db";
const DEFAULT_SPOOL_DIR: &str = "~/.fieldsync/spool";
const DEFAULT_PROBE_ADDR: &str = "1.1.1.1:443";
const DEFAULT_POLL_SECS: u64 = 30;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize logging (JSON format for production)
    let log_format = std::env::var("FIELDSYNC_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("fieldsync=info"))
        .expect("Failed to create env filter");

    match log_format.as_str() {
        "json" => {
            // Production: JSON structured logging
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            // Development: Pretty formatting with colors
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }

    info!("Fieldsync agent v{} starting...", VERSION);

    // 2. Load configuration
    let db_path = std::env::var("FIELDSYNC_DB_PATH")
        .unwrap_or_else(|_| shellexpand::tilde(DEFAULT_DB_PATH).into_owned());
    let spool_dir = std::env::var("FIELDSYNC_SPOOL_DIR")
        .unwrap_or_else(|_| shellexpand::tilde(DEFAULT_SPOOL_DIR).into_owned());
    let probe_addr = std::env::var("FIELDSYNC_PROBE_ADDR")
        .unwrap_or_else(|_| DEFAULT_PROBE_ADDR.to_string());
    let poll_secs: u64 = std::env::var("FIELDSYNC_POLL_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_POLL_SECS);

    let api_base = std::env::var("FIELDSYNC_API_BASE")
        .context("FIELDSYNC_API_BASE is required (backend base URL)")?;
    let api_token = std::env::var("FIELDSYNC_API_TOKEN")
        .context("FIELDSYNC_API_TOKEN is required (backend bearer token)")?;

    info!(db_path = %db_path, "Initializing queue store...");

    // 3. Initialize database
    if let Some(parent) = std::path::Path::new(&db_path).parent() {
        std::fs::create_dir_all(parent).context("creating database directory")?;
    }
    let pool = create_pool(&db_path).await.context("DB pool creation failed")?;
    run_migrations(&pool).await.context("Migration failed")?;

    // 4. Setup dependencies (DI wiring)
    let store = Arc::new(SqliteRecordStore::new(pool));
    let queue = Arc::new(QueueManager::new(
        store,
        Arc::new(UuidProvider),
        Arc::new(SystemTimeProvider),
        BackoffPolicy::default(),
    ));

    let handler = Arc::new(
        HttpSubmissionHandler::new(HttpHandlerConfig::new(
            api_base.trim_end_matches('/'),
            api_token,
        ))
        .context("HTTP handler setup failed")?,
    );

    // 5. Start connectivity monitor (assume offline until a probe lands)
    let (publisher, signal) = connectivity_channel(false);
    let monitor = ConnectivityMonitor::new(
        MonitorConfig {
            probe_addr,
            ..MonitorConfig::default()
        },
        publisher,
    );
    let monitor_handle = monitor.start();

    // 6. Start sync worker (flushes on startup, reconnect, and poll tick)
    info!("Starting sync worker...");
    let worker_handle = Worker::new(queue.clone(), handler, signal)
        .with_poll_interval(Duration::from_secs(poll_secs))
        .with_flush_callback(|report| {
            if report.remaining > 0 {
                info!(pending = report.remaining, "Items still pending");
            }
        })
        .start();

    // 7. Start spool ingestion
    let spool_handle = SpoolIngest::new(
        SpoolConfig {
            dir: spool_dir.into(),
            scan_interval: Duration::from_secs(2),
        },
        queue.clone(),
    )
    .start();

    info!("Agent ready. Queued submissions will sync when online.");
    info!("Press Ctrl+C to shutdown");

    // 8. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received. Exiting gracefully...");

    // 9. Graceful shutdown: stop triggers; an in-flight flush completes
    spool_handle.stop();
    monitor_handle.stop();
    worker_handle.stop();
    spool_handle.stopped().await;
    monitor_handle.stopped().await;
    let _ = tokio::time::timeout(Duration::from_secs(5), worker_handle.stopped()).await;

    info!("Shutdown complete.");

    Ok(())
}
