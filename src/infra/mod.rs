//! Infrastructure adapters for durable counters and job status storage.

pub mod counter;
pub mod store;

pub use counter::{FileCounter, InMemoryCounter};
pub use store::InMemoryJobStore;
