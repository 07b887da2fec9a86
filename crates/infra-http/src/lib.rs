// Fieldsync Infrastructure - HTTP Adapter
// Implements: SubmissionHandler against the hosted REST/storage backend

mod handler;

pub use handler::{HttpHandlerConfig, HttpSubmissionHandler};
