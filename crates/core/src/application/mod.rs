// Application Layer - Queue operations and scheduling

pub mod backoff;
pub mod queue;
pub mod worker;

// Re-exports
pub use backoff::BackoffPolicy;
pub use queue::{EnqueueRequest, FlushReport, QueueManager};
pub use worker::{Worker, WorkerHandle};
