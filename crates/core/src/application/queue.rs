// Queue Manager - enqueue, list, remove, flush

use crate::application::backoff::BackoffPolicy;
use crate::domain::{ItemId, Payload, QueueItem};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, RecordStore, SubmissionHandler, TimeProvider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Enqueue request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueRequest {
    /// Explicit item id; generated if absent. Re-enqueueing an explicit
    /// id overwrites the stored item (caller responsibility).
    #[serde(default)]
    pub id: Option<ItemId>,

    pub payload: Payload,

    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Outcome of one flush pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Items inspected during the pass
    pub attempted: usize,
    /// Items delivered and removed
    pub delivered: usize,
    /// Items that failed and were rescheduled with backoff
    pub rescheduled: usize,
    /// Items not yet due, left untouched
    pub skipped: usize,
    /// Queue length after the pass (for the pending-items badge)
    pub remaining: usize,
}

/// Queue Manager
///
/// Sole writer of the record store namespace. Owns the item lifecycle:
/// enqueue persists, flush delivers-and-deletes or reschedules with
/// backoff, and nothing else mutates stored items.
pub struct QueueManager {
    store: Arc<dyn RecordStore>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
    backoff: BackoffPolicy,
    // Explicit single-flight gate: overlapping flush calls serialize
    // instead of racing on the same keys
    flush_gate: Mutex<()>,
}

impl QueueManager {
    pub fn new(
        store: Arc<dyn RecordStore>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
        backoff: BackoffPolicy,
    ) -> Self {
        Self {
            store,
            id_provider,
            time_provider,
            backoff,
            flush_gate: Mutex::new(()),
        }
    }

    /// Persist a new item, immediately eligible for delivery.
    ///
    /// Never touches the network. A storage failure surfaces to the
    /// caller: the item is NOT queued and the user must be told.
    pub async fn enqueue(&self, req: EnqueueRequest) -> Result<ItemId> {
        validate_request(&req)?;

        let id = match req.id {
            Some(id) => id,
            None => self.id_provider.generate_id(),
        };
        let now = self.time_provider.now_millis();

        let item = QueueItem::new(id.clone(), now, req.payload, req.metadata);
        let raw = serde_json::to_vec(&item)?;
        self.store.put(&item.id, &raw).await?;

        info!(
            item_id = %item.id,
            kind = %item.payload.kind(),
            size = %item.payload.size(),
            "Item queued"
        );

        Ok(id)
    }

    /// All readable persisted items, earliest `next_attempt_at` first;
    /// ties keep store (insertion) order.
    ///
    /// Records this build cannot interpret are skipped with a warning
    /// and left in the store, never deleted.
    pub async fn list_queued(&self) -> Result<Vec<QueueItem>> {
        let keys = self.store.list_keys().await?;
        let mut items = Vec::with_capacity(keys.len());

        for key in keys {
            let raw = match self.store.get(&key).await? {
                Some(raw) => raw,
                None => continue, // removed between list and read
            };

            let item: QueueItem = match serde_json::from_slice(&raw) {
                Ok(item) => item,
                Err(e) => {
                    warn!(key = %key, error = %e, "Skipping undecodable queue record");
                    continue;
                }
            };

            if !item.is_readable() {
                warn!(
                    item_id = %item.id,
                    schema_version = %item.schema_version,
                    "Skipping record from a newer application version"
                );
                continue;
            }

            items.push(item);
        }

        // Stable sort: equal schedule times keep insertion order
        items.sort_by_key(|item| item.next_attempt_at);
        Ok(items)
    }

    /// Queue length, for the "N items pending" badge
    pub async fn pending_count(&self) -> Result<usize> {
        Ok(self.list_queued().await?.len())
    }

    /// Explicitly remove an item without delivering it
    pub async fn remove(&self, id: &str) -> Result<()> {
        self.store.delete(id).await?;
        info!(item_id = %id, "Item removed");
        Ok(())
    }

    /// One pass over all due items, attempting delivery via the handler.
    ///
    /// Items are processed strictly in `list_queued` order, one at a
    /// time. A handler failure (or panic) reschedules that item with
    /// backoff and continues to the next; it never aborts the pass or
    /// propagates out. Only a storage failure propagates.
    ///
    /// Overlapping calls serialize on an internal gate, so two flushes
    /// can never race on the same keys.
    pub async fn flush(&self, handler: Arc<dyn SubmissionHandler>) -> Result<FlushReport> {
        let _gate = self.flush_gate.lock().await;

        let items = self.list_queued().await?;
        let mut report = FlushReport {
            attempted: items.len(),
            ..FlushReport::default()
        };

        for mut item in items {
            let now = self.time_provider.now_millis();
            if !item.is_due(now) {
                // Not yet eligible; a delayed item never blocks the rest
                report.skipped += 1;
                continue;
            }

            match self.deliver_guarded(Arc::clone(&handler), &item).await {
                Ok(()) => {
                    self.store.delete(&item.id).await?;
                    report.delivered += 1;
                    info!(item_id = %item.id, "Item delivered");
                }
                Err(reason) => {
                    let delay = self.backoff.delay_for(item.retries + 1);
                    item.record_failure(now + delay);

                    let raw = serde_json::to_vec(&item)?;
                    self.store.put(&item.id, &raw).await?;
                    report.rescheduled += 1;

                    warn!(
                        item_id = %item.id,
                        retries = %item.retries,
                        next_attempt_at = %item.next_attempt_at,
                        error = %reason,
                        "Delivery failed, rescheduled with backoff"
                    );
                }
            }
        }

        report.remaining = self.pending_count().await?;
        info!(
            attempted = %report.attempted,
            delivered = %report.delivered,
            rescheduled = %report.rescheduled,
            skipped = %report.skipped,
            remaining = %report.remaining,
            "Flush complete"
        );
        Ok(report)
    }

    /// Invoke the handler on its own task so a panicking handler is
    /// indistinguishable from an ordinary failure
    async fn deliver_guarded(
        &self,
        handler: Arc<dyn SubmissionHandler>,
        item: &QueueItem,
    ) -> std::result::Result<(), String> {
        let item = item.clone();
        let handle = tokio::task::spawn(async move { handler.deliver(&item).await });

        match handle.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(join_err) if join_err.is_panic() => Err("handler panicked".to_string()),
            Err(join_err) => Err(format!("handler cancelled: {}", join_err)),
        }
    }
}

fn validate_request(req: &EnqueueRequest) -> Result<()> {
    if let Some(id) = &req.id {
        if id.trim().is_empty() {
            return Err(AppError::Validation("explicit item id is empty".to_string()));
        }
    }

    if let Payload::Media { file_name, content_type, .. } = &req.payload {
        if file_name.trim().is_empty() {
            return Err(AppError::Validation("media file name is empty".to_string()));
        }
        if content_type.trim().is_empty() {
            return Err(AppError::Validation("media content type is empty".to_string()));
        }
    }

    Ok(())
}
