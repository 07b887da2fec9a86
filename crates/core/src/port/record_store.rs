// Durable Record Store Port (Interface)

use async_trait::async_trait;
use thiserror::Error;

/// Record store failure. Surfaced to the caller of enqueue/list/flush,
/// never swallowed: the application must treat an enqueue failure as
/// "item not queued" and tell the user immediately.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Read failed for key {key}: {message}")]
    Read { key: String, message: String },

    #[error("Write failed for key {key}: {message}")]
    Write { key: String, message: String },

    #[error("Storage error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Minimal async key-value persistence abstraction.
///
/// Guarantees persistence across process restarts on the same device;
/// does not guarantee durability across device loss. `list_keys` order
/// is adapter-defined (the SQLite adapter returns insertion order) and
/// callers must sort explicitly.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert or overwrite the value for `key`
    async fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Fetch the value for `key`, if present
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// All currently stored keys
    async fn list_keys(&self) -> Result<Vec<String>>;
}

pub mod mocks {
    use super::{RecordStore, Result, StorageError};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    /// In-process store preserving insertion order, for unit tests
    pub struct MemoryRecordStore {
        inner: Mutex<MemoryInner>,
    }

    struct MemoryInner {
        values: HashMap<String, Vec<u8>>,
        order: Vec<String>,
    }

    impl MemoryRecordStore {
        pub fn new() -> Self {
            Self {
                inner: Mutex::new(MemoryInner {
                    values: HashMap::new(),
                    order: Vec::new(),
                }),
            }
        }
    }

    impl Default for MemoryRecordStore {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl RecordStore for MemoryRecordStore {
        async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
            let mut inner = self.inner.lock().await;
            if inner.values.insert(key.to_string(), value.to_vec()).is_none() {
                // First write keeps its slot; overwrites do not reorder
                inner.order.push(key.to_string());
            }
            Ok(())
        }

        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            let inner = self.inner.lock().await;
            Ok(inner.values.get(key).cloned())
        }

        async fn delete(&self, key: &str) -> Result<()> {
            let mut inner = self.inner.lock().await;
            inner.values.remove(key);
            inner.order.retain(|k| k != key);
            Ok(())
        }

        async fn list_keys(&self) -> Result<Vec<String>> {
            let inner = self.inner.lock().await;
            Ok(inner.order.clone())
        }
    }

    /// Store whose every operation fails, for error-propagation tests
    pub struct FailingRecordStore;

    #[async_trait]
    impl RecordStore for FailingRecordStore {
        async fn put(&self, key: &str, _value: &[u8]) -> Result<()> {
            Err(StorageError::Write {
                key: key.to_string(),
                message: "store offline".to_string(),
            })
        }

        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            Err(StorageError::Read {
                key: key.to_string(),
                message: "store offline".to_string(),
            })
        }

        async fn delete(&self, key: &str) -> Result<()> {
            Err(StorageError::Write {
                key: key.to_string(),
                message: "store offline".to_string(),
            })
        }

        async fn list_keys(&self) -> Result<Vec<String>> {
            Err(StorageError::Unavailable("store offline".to_string()))
        }
    }
}
