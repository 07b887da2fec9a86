// Domain Layer - Queue item model

pub mod item;

pub use item::{ItemId, Payload, QueueItem, SCHEMA_VERSION};
