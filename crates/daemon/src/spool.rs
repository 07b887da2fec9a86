//! Spool-directory ingestion.
//!
//! The capture side of the app drops files into a spool directory:
//! `*.json` files become form submissions, everything else becomes a
//! media upload, and a `<name>.meta.json` sidecar becomes the item's
//! metadata (the form values associated with a captured photo). Files
//! leave the spool only after `enqueue` has persisted them; if the
//! store rejects the write the file stays for the next scan and the
//! user-facing log says so.

use anyhow::{Context, Result};
use fieldsync_core::application::{EnqueueRequest, QueueManager};
use fieldsync_core::domain::Payload;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const META_SUFFIX: &str = ".meta.json";

#[derive(Debug, Clone)]
pub struct SpoolConfig {
    pub dir: PathBuf,
    pub scan_interval: Duration,
}

pub struct SpoolIngest {
    config: SpoolConfig,
    queue: Arc<QueueManager>,
}

impl SpoolIngest {
    pub fn new(config: SpoolConfig, queue: Arc<QueueManager>) -> Self {
        Self { config, queue }
    }

    /// Spawn the scan loop. The first scan fires immediately.
    pub fn start(self) -> SpoolHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let join = tokio::spawn(self.run(stop_rx));
        SpoolHandle { stop_tx, join }
    }

    async fn run(self, mut stop_rx: watch::Receiver<bool>) {
        info!(dir = %self.config.dir.display(), "Spool ingestion started");

        if let Err(e) = tokio::fs::create_dir_all(&self.config.dir).await {
            warn!(error = %e, "Cannot create spool directory; ingestion disabled");
            return;
        }

        let mut tick = tokio::time::interval(self.config.scan_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(e) = self.scan_once().await {
                        warn!(error = %e, "Spool scan failed");
                    }
                }
                _ = stop_rx.changed() => {
                    if *stop_rx.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Spool ingestion stopped");
    }

    /// One pass over the spool directory
    pub async fn scan_once(&self) -> Result<usize> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.config.dir)
            .await
            .context("reading spool directory")?;
        while let Some(entry) = dir.next_entry().await? {
            if entry.file_type().await?.is_file() {
                entries.push(entry.path());
            }
        }
        entries.sort(); // deterministic ingest order

        let mut ingested = 0;
        for path in entries {
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !is_ingestible(file_name) {
                continue;
            }

            match self.ingest_file(&path, file_name).await {
                Ok(true) => ingested += 1,
                Ok(false) => {}
                Err(e) => {
                    // Item not queued: the file stays for the next scan
                    warn!(file = %path.display(), error = %e, "Spool file not queued");
                }
            }
        }

        Ok(ingested)
    }

    /// Returns Ok(true) if the file was queued and removed
    async fn ingest_file(&self, path: &Path, file_name: &str) -> Result<bool> {
        let bytes = tokio::fs::read(path).await.context("reading spool file")?;

        let payload = if file_name.ends_with(".json") {
            match serde_json::from_slice(&bytes) {
                Ok(body) => Payload::Form { body },
                Err(e) => {
                    // Quarantine instead of re-parsing it every scan
                    warn!(file = %path.display(), error = %e, "Malformed form file, quarantining");
                    let rejected = path.with_extension("json.rejected");
                    tokio::fs::rename(path, &rejected).await.ok();
                    return Ok(false);
                }
            }
        } else {
            Payload::Media {
                file_name: file_name.to_string(),
                content_type: content_type_for(path).to_string(),
                bytes,
            }
        };

        let meta_path = sidecar_path(path);
        let metadata = match tokio::fs::read(&meta_path).await {
            Ok(raw) => match serde_json::from_slice(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(file = %meta_path.display(), error = %e, "Ignoring malformed metadata sidecar");
                    None
                }
            },
            Err(_) => None,
        };

        let id = self
            .queue
            .enqueue(EnqueueRequest {
                id: None,
                payload,
                metadata,
            })
            .await?;

        tokio::fs::remove_file(path).await.context("removing spooled file")?;
        let _ = tokio::fs::remove_file(&meta_path).await;

        info!(item_id = %id, file = %file_name, "Spool file queued");
        Ok(true)
    }
}

/// Handle returned by [`SpoolIngest::start`]
pub struct SpoolHandle {
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SpoolHandle {
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    pub async fn stopped(self) {
        let _ = self.join.await;
    }
}

fn is_ingestible(file_name: &str) -> bool {
    !(file_name.starts_with('.')
        || file_name.ends_with(META_SUFFIX)
        || file_name.ends_with(".part")
        || file_name.ends_with(".tmp")
        || file_name.ends_with(".rejected"))
}

fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(META_SUFFIX);
    path.with_file_name(name)
}

fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("heic") => "image/heic",
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("m4a") => "audio/mp4",
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldsync_core::application::BackoffPolicy;
    use fieldsync_core::port::id_provider::mocks::SequentialIdProvider;
    use fieldsync_core::port::record_store::mocks::{FailingRecordStore, MemoryRecordStore};
    use fieldsync_core::port::time_provider::mocks::FixedTimeProvider;
    use fieldsync_core::port::RecordStore;
    use serde_json::json;

    fn test_queue(store: Arc<dyn RecordStore>) -> Arc<QueueManager> {
        Arc::new(QueueManager::new(
            store,
            Arc::new(SequentialIdProvider::new()),
            Arc::new(FixedTimeProvider::new(1_000_000)),
            BackoffPolicy::default(),
        ))
    }

    fn temp_spool() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("fieldsync_spool_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn ingest(dir: &Path, queue: Arc<QueueManager>) -> SpoolIngest {
        SpoolIngest::new(
            SpoolConfig {
                dir: dir.to_path_buf(),
                scan_interval: Duration::from_secs(3600),
            },
            queue,
        )
    }

    #[tokio::test]
    async fn test_json_file_becomes_form_item() {
        let dir = temp_spool();
        let queue = test_queue(Arc::new(MemoryRecordStore::new()));

        std::fs::write(dir.join("report.json"), br#"{"roof": "damaged"}"#).unwrap();

        let ingested = ingest(&dir, queue.clone()).scan_once().await.unwrap();
        assert_eq!(ingested, 1);

        let items = queue.list_queued().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].payload, Payload::Form { body: json!({"roof": "damaged"}) });
        assert!(!dir.join("report.json").exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_media_file_with_sidecar_metadata() {
        let dir = temp_spool();
        let queue = test_queue(Arc::new(MemoryRecordStore::new()));

        std::fs::write(dir.join("wall.jpg"), [0xff, 0xd8]).unwrap();
        std::fs::write(
            dir.join("wall.jpg.meta.json"),
            br#"{"inspection_id": "insp-9"}"#,
        )
        .unwrap();

        ingest(&dir, queue.clone()).scan_once().await.unwrap();

        let items = queue.list_queued().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(
            items[0].payload,
            Payload::Media {
                file_name: "wall.jpg".to_string(),
                content_type: "image/jpeg".to_string(),
                bytes: vec![0xff, 0xd8],
            }
        );
        assert_eq!(items[0].metadata, Some(json!({"inspection_id": "insp-9"})));
        assert!(!dir.join("wall.jpg").exists());
        assert!(!dir.join("wall.jpg.meta.json").exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_partial_and_hidden_files_are_skipped() {
        let dir = temp_spool();
        let queue = test_queue(Arc::new(MemoryRecordStore::new()));

        std::fs::write(dir.join("upload.jpg.part"), [1]).unwrap();
        std::fs::write(dir.join(".DS_Store"), [1]).unwrap();

        let ingested = ingest(&dir, queue.clone()).scan_once().await.unwrap();
        assert_eq!(ingested, 0);
        assert!(queue.list_queued().await.unwrap().is_empty());
        assert!(dir.join("upload.jpg.part").exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_malformed_form_file_is_quarantined() {
        let dir = temp_spool();
        let queue = test_queue(Arc::new(MemoryRecordStore::new()));

        std::fs::write(dir.join("broken.json"), b"{not json").unwrap();

        let ingest = ingest(&dir, queue.clone());
        ingest.scan_once().await.unwrap();
        assert!(queue.list_queued().await.unwrap().is_empty());
        assert!(!dir.join("broken.json").exists());
        assert!(dir.join("broken.json.rejected").exists());

        // Quarantined files are not re-ingested
        let again = ingest.scan_once().await.unwrap();
        assert_eq!(again, 0);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_enqueue_failure_leaves_file_for_next_scan() {
        let dir = temp_spool();
        let queue = test_queue(Arc::new(FailingRecordStore));

        std::fs::write(dir.join("report.json"), br#"{"roof": "ok"}"#).unwrap();

        let ingested = ingest(&dir, queue).scan_once().await.unwrap();
        assert_eq!(ingested, 0);
        assert!(dir.join("report.json").exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
