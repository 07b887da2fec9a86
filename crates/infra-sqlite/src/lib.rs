// Fieldsync Infrastructure - SQLite Adapter
// Implements: RecordStore over a single queue_records table

mod connection;
mod migration;
mod record_store;

pub use connection::create_pool;
pub use migration::run_migrations;
pub use record_store::SqliteRecordStore;
