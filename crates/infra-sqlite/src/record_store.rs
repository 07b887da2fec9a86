// SQLite RecordStore Implementation

use async_trait::async_trait;
use fieldsync_core::port::{RecordStore, StorageError};
use sqlx::SqlitePool;

type Result<T> = std::result::Result<T, StorageError>;

// Helper to describe a sqlx::Error with SQLite-specific detail
fn describe_sqlx_error(err: &sqlx::Error) -> String {
    match err {
        sqlx::Error::Database(db_err) => {
            if let Some(code) = db_err.code() {
                // SQLite error codes: https://www.sqlite.org/rescode.html
                match code.as_ref() {
                    "5" => format!("database locked (SQLITE_BUSY): {}", db_err.message()),
                    "13" => format!("database full: {}", db_err.message()),
                    other => format!("database error [{}]: {}", other, db_err.message()),
                }
            } else {
                format!("database error: {}", db_err.message())
            }
        }
        sqlx::Error::PoolTimedOut => "connection pool timed out".to_string(),
        _ => err.to_string(),
    }
}

/// Durable record store backed by a single SQLite table.
///
/// `seq` is assigned once at first insert and kept across upserts, so
/// `list_keys` reflects insertion order even after an item is rewritten
/// for a reschedule.
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO queue_records (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Write {
            key: key.to_string(),
            message: describe_sqlx_error(&e),
        })?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value: Option<Vec<u8>> =
            sqlx::query_scalar("SELECT value FROM queue_records WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StorageError::Read {
                    key: key.to_string(),
                    message: describe_sqlx_error(&e),
                })?;

        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM queue_records WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Write {
                key: key.to_string(),
                message: describe_sqlx_error(&e),
            })?;

        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        let keys: Vec<String> =
            sqlx::query_scalar("SELECT key FROM queue_records ORDER BY seq ASC")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StorageError::Unavailable(describe_sqlx_error(&e)))?;

        Ok(keys)
    }
}
