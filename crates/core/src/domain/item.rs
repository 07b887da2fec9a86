// Queue Item Domain Model

use serde::{Deserialize, Serialize};

/// Queue item ID (UUID v4 unless supplied by the caller)
pub type ItemId = String;

/// Persisted record format version.
///
/// Records carrying a *newer* version than this build understands are
/// skipped during listing and left in the store, never deleted.
pub const SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    // Records written before the field existed are version 1
    1
}

/// One unit of deferred work: a media upload or a form submission.
///
/// The queue is polymorphic over the payload kind but never interprets
/// payload contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    /// Binary attachment captured in the field (photo, audio note, ...)
    Media {
        file_name: String,
        content_type: String,
        bytes: Vec<u8>,
    },
    /// Structured form-submission body
    Form { body: serde_json::Value },
}

impl Payload {
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Media { .. } => "media",
            Payload::Form { .. } => "form",
        }
    }

    /// Payload size in bytes (media byte length, or serialized form length)
    pub fn size(&self) -> usize {
        match self {
            Payload::Media { bytes, .. } => bytes.len(),
            Payload::Form { body } => body.to_string().len(),
        }
    }
}

/// Queue Item Entity
///
/// Lifecycle: created by `enqueue`; read and possibly rescheduled by
/// `flush`; deleted by `flush` on handler success or by explicit removal.
/// Only `retries` and `next_attempt_at` mutate after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    pub id: ItemId,
    pub payload: Payload,

    /// Caller-supplied context, passed back unmodified to the handler
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,

    /// Failed attempts so far. Monotonically non-decreasing.
    #[serde(default)]
    pub retries: i32,

    pub enqueued_at: i64, // epoch ms

    /// Epoch ms before which the item must not be retried.
    /// Missing in the record means due-now.
    #[serde(default)]
    pub next_attempt_at: i64,
}

impl QueueItem {
    /// Create a new item, immediately eligible for delivery
    ///
    /// # Arguments
    ///
    /// * `id` - Unique item ID (injected, not generated)
    /// * `now_millis` - Creation timestamp in epoch ms (injected, not system time)
    /// * `payload` - Media or form payload
    /// * `metadata` - Optional caller context
    pub fn new(
        id: impl Into<String>,
        now_millis: i64,
        payload: Payload,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            id: id.into(),
            payload,
            metadata,
            retries: 0,
            enqueued_at: now_millis,
            next_attempt_at: now_millis,
        }
    }

    /// Whether the item is eligible for a delivery attempt at `now_millis`
    pub fn is_due(&self, now_millis: i64) -> bool {
        self.next_attempt_at <= now_millis
    }

    /// Record a failed delivery attempt.
    ///
    /// Increments `retries` and moves `next_attempt_at` forward.
    /// The reschedule time never moves backwards for a given item.
    pub fn record_failure(&mut self, next_attempt_at: i64) {
        self.retries += 1;
        self.next_attempt_at = self.next_attempt_at.max(next_attempt_at);
    }

    /// Whether this build can interpret the persisted record
    pub fn is_readable(&self) -> bool {
        self.schema_version <= SCHEMA_VERSION
    }
}

impl QueueItem {
    /// Create a test item with deterministic ID and timestamp.
    ///
    /// Uses a simple counter for deterministic test IDs (test-1, test-2, ...).
    /// Timestamps start at 1000 and increment by 1000.
    ///
    /// **Note**: This method should only be used in tests. For production code,
    /// always inject ID and time via providers.
    pub fn new_test(payload: Payload) -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static TEST_COUNTER: AtomicU64 = AtomicU64::new(1);

        let counter = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let id = format!("test-{}", counter);
        let enqueued_at = (counter * 1000) as i64;

        Self::new(id, enqueued_at, payload, None)
    }
}
