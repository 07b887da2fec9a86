//! End-to-end offline replay over a real SQLite store.

use std::sync::Arc;
use std::time::Duration;

use fieldsync_core::application::{BackoffPolicy, EnqueueRequest, QueueManager, Worker};
use fieldsync_core::domain::Payload;
use fieldsync_core::port::connectivity_channel;
use fieldsync_core::port::id_provider::UuidProvider;
use fieldsync_core::port::submission_handler::mocks::RecordingHandler;
use fieldsync_core::port::time_provider::SystemTimeProvider;
use fieldsync_core::port::time_provider::TimeProvider;
use fieldsync_infra_sqlite::{create_pool, run_migrations, SqliteRecordStore};

async fn sqlite_queue() -> Arc<QueueManager> {
    sqlite_queue_with(BackoffPolicy::default()).await
}

async fn sqlite_queue_with(backoff: BackoffPolicy) -> Arc<QueueManager> {
    let pool = create_pool("sqlite::memory:").await.unwrap();
    run_migrations(&pool).await.unwrap();

    Arc::new(QueueManager::new(
        Arc::new(SqliteRecordStore::new(pool)),
        Arc::new(UuidProvider),
        Arc::new(SystemTimeProvider),
        backoff,
    ))
}

fn form_request(body: serde_json::Value) -> EnqueueRequest {
    EnqueueRequest {
        id: None,
        payload: Payload::Form { body },
        metadata: None,
    }
}

fn media_request(name: &str) -> EnqueueRequest {
    EnqueueRequest {
        id: None,
        payload: Payload::Media {
            file_name: name.to_string(),
            content_type: "image/jpeg".to_string(),
            bytes: vec![0xff, 0xd8, 0xff],
        },
        metadata: Some(serde_json::json!({"inspection_id": "insp-1"})),
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn test_items_queued_offline_sync_on_reconnect() {
    let queue = sqlite_queue().await;
    let handler = Arc::new(RecordingHandler::new());
    let (publisher, signal) = connectivity_channel(false);

    let worker = Worker::new(queue.clone(), handler.clone(), signal).start();
    settle().await; // startup flush over an empty queue

    // Inspector keeps working offline: one form, one photo
    let form_id = queue.enqueue(form_request(serde_json::json!({"roof": "damaged"})))
        .await
        .unwrap();
    let media_id = queue.enqueue(media_request("north-wall.jpg")).await.unwrap();
    assert_eq!(handler.call_count(), 0);
    assert_eq!(queue.pending_count().await.unwrap(), 2);

    // Connectivity returns: one automatic flush, both items in due order
    publisher.set_online(true);
    settle().await;

    assert_eq!(handler.calls(), vec![form_id, media_id]);
    assert_eq!(queue.pending_count().await.unwrap(), 0);

    worker.stop();
    worker.stopped().await;
}

#[tokio::test]
async fn test_partial_failure_keeps_failed_item_in_sqlite() {
    let queue = sqlite_queue().await;
    let handler = Arc::new(RecordingHandler::new());

    let failing = queue
        .enqueue(form_request(serde_json::json!({"n": 1})))
        .await
        .unwrap();
    let succeeding = queue
        .enqueue(form_request(serde_json::json!({"n": 2})))
        .await
        .unwrap();
    handler.fail_for(failing.clone());

    let report = queue.flush(handler.clone()).await.unwrap();
    assert_eq!(report.delivered, 1);
    assert_eq!(report.rescheduled, 1);
    assert_eq!(report.remaining, 1);
    assert_eq!(handler.calls(), vec![failing.clone(), succeeding]);

    // The failed item is rescheduled into the future, never dropped
    let items = queue.list_queued().await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, failing);
    assert_eq!(items[0].retries, 1);
    assert!(items[0].next_attempt_at > SystemTimeProvider.now_millis());
}

#[tokio::test]
async fn test_rescheduled_item_keeps_insertion_slot() {
    // Jitter off so the reschedule order is deterministic
    let queue = sqlite_queue_with(BackoffPolicy::new(1000, 60_000, 0)).await;
    let handler = Arc::new(RecordingHandler::new());

    let first = queue
        .enqueue(form_request(serde_json::json!({"n": 1})))
        .await
        .unwrap();
    let second = queue
        .enqueue(form_request(serde_json::json!({"n": 2})))
        .await
        .unwrap();

    // Fail both once: each is rewritten in place for its reschedule
    handler.fail_for(first.clone());
    handler.fail_for(second.clone());
    queue.flush(handler.clone()).await.unwrap();

    let items = queue.list_queued().await.unwrap();
    assert_eq!(items.len(), 2);
    // Backoff was computed in pass order, so the schedule keeps them ordered
    assert_eq!(items[0].id, first);
    assert_eq!(items[1].id, second);
}
