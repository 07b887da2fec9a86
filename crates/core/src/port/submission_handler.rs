// Submission Handler Port (Interface)

use crate::domain::QueueItem;
use async_trait::async_trait;
use thiserror::Error;

/// Delivery failure reported by a handler.
///
/// The queue does not distinguish failure kinds: network errors,
/// validation rejections and server errors are all retried identically.
#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rejected by backend ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Request timed out")]
    Timeout,

    #[error("Submission error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, SubmissionError>;

/// Delivery contract the queue calls during a flush.
///
/// Must resolve on success and return an error on any failure; the item
/// is deleted on success and rescheduled with backoff otherwise.
#[async_trait]
pub trait SubmissionHandler: Send + Sync {
    async fn deliver(&self, item: &QueueItem) -> Result<()>;
}

pub mod mocks {
    use super::{Result, SubmissionError, SubmissionHandler};
    use crate::domain::{ItemId, QueueItem};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Records delivery order and succeeds, except for ids told to fail
    pub struct RecordingHandler {
        delivered: Mutex<Vec<ItemId>>,
        failing_ids: Mutex<HashSet<ItemId>>,
    }

    impl RecordingHandler {
        pub fn new() -> Self {
            Self {
                delivered: Mutex::new(Vec::new()),
                failing_ids: Mutex::new(HashSet::new()),
            }
        }

        /// Make `deliver` fail for this item id
        pub fn fail_for(&self, id: impl Into<ItemId>) {
            self.failing_ids.lock().unwrap().insert(id.into());
        }

        /// All deliver calls so far, in invocation order (including failed ones)
        pub fn calls(&self) -> Vec<ItemId> {
            self.delivered.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.delivered.lock().unwrap().len()
        }
    }

    impl Default for RecordingHandler {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl SubmissionHandler for RecordingHandler {
        async fn deliver(&self, item: &QueueItem) -> Result<()> {
            self.delivered.lock().unwrap().push(item.id.clone());
            if self.failing_ids.lock().unwrap().contains(&item.id) {
                return Err(SubmissionError::Network("connection refused".to_string()));
            }
            Ok(())
        }
    }

    /// Handler that always fails
    pub struct FailingHandler;

    #[async_trait]
    impl SubmissionHandler for FailingHandler {
        async fn deliver(&self, _item: &QueueItem) -> Result<()> {
            Err(SubmissionError::Network("connection refused".to_string()))
        }
    }

    /// Handler that panics, for panic-isolation tests
    pub struct PanickingHandler;

    #[async_trait]
    impl SubmissionHandler for PanickingHandler {
        async fn deliver(&self, _item: &QueueItem) -> Result<()> {
            panic!("handler panicked");
        }
    }
}
