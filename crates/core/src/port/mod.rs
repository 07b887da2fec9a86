// Port Layer - Interfaces for external dependencies

pub mod connectivity;
pub mod id_provider; // For deterministic testing
pub mod record_store;
pub mod submission_handler;
pub mod time_provider;

// Re-exports
pub use connectivity::{connectivity_channel, ConnectivityPublisher, ConnectivitySignal};
pub use id_provider::IdProvider;
pub use record_store::{RecordStore, StorageError};
pub use submission_handler::{SubmissionError, SubmissionHandler};
pub use time_provider::TimeProvider;
