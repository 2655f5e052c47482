//! Runtime adapters, task dispatch and API surface.

pub mod api;
pub mod dispatch;
pub mod tokio_spawner;

pub use api::{
    health, initialize_source, list_resources, load_source, source_status, Health,
    LoadSourceResponse, ResourceSnapshot, SourceLoadStatus,
};
pub use dispatch::{DispatchOutcome, DispatchRequest, Dispatcher};
pub use tokio_spawner::TokioSpawner;
