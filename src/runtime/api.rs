//! API-facing request/response models.

use serde::{Deserialize, Serialize};

use crate::core::{
    DataSourceCoordinator, InitAttempt, InitStatus, LoadAttempt, Resource, ResourceAllocator,
    SchedulerError, SessionInfo, Spawn,
};

/// Loading state of one data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceLoadStatus {
    /// Source name.
    pub source: String,
    /// Whether a session is running.
    pub loading: bool,
    /// Progress in `[0, 1]`, or `-1` when idle.
    pub progress: f32,
    /// Error of the last failed load.
    pub last_error: Option<String>,
    /// Completion time of the last successful load.
    pub loaded_at_ms: Option<u128>,
    /// State of the last initializer run.
    pub init_status: Option<InitStatus>,
}

/// Response to a load request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadSourceResponse {
    /// Whether a new session was started.
    pub accepted: bool,
    /// Human-readable outcome.
    pub message: String,
    /// The started session.
    pub session: Option<SessionInfo>,
}

/// Capacity and availability of one resource kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    /// Resource kind.
    pub resource: Resource,
    /// Configured capacity.
    pub capacity: u64,
    /// Units not currently granted.
    pub available: u64,
}

/// Health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// Healthy flag.
    pub ok: bool,
}

/// Current loading state of `source`.
pub fn source_status<S>(coordinator: &DataSourceCoordinator<S>, source: &str) -> SourceLoadStatus {
    let loading = coordinator.is_loading(source);
    SourceLoadStatus {
        source: source.to_string(),
        loading,
        progress: coordinator.progress(source),
        last_error: coordinator.error(source),
        loaded_at_ms: coordinator.catalog(source).map(|c| c.loaded_at_ms),
        init_status: coordinator.init_status(source),
    }
}

/// Ask the coordinator to load `source`; busy and unknown sources become
/// rejected responses rather than errors.
pub fn load_source<S: Spawn>(
    coordinator: &DataSourceCoordinator<S>,
    source: &str,
) -> LoadSourceResponse {
    match coordinator.try_load(source) {
        Ok(LoadAttempt::Started(session)) => LoadSourceResponse {
            accepted: true,
            message: format!("{source} loading started"),
            session: Some(session),
        },
        Ok(LoadAttempt::Busy) => LoadSourceResponse {
            accepted: false,
            message: SchedulerError::SessionBusy(source.to_string()).to_string(),
            session: None,
        },
        Err(err) => LoadSourceResponse {
            accepted: false,
            message: err.to_string(),
            session: None,
        },
    }
}

/// Run the initializer of `source`; busy, unknown and failing sources become
/// rejected responses.
pub async fn initialize_source<S>(
    coordinator: &DataSourceCoordinator<S>,
    source: &str,
) -> LoadSourceResponse {
    let (accepted, message) = match coordinator.try_initialize(source).await {
        Ok(InitAttempt::Completed) => (true, format!("{source} initialized")),
        Ok(InitAttempt::Busy) => (false, format!("initializer of {source} is running")),
        Err(err) => (false, err.to_string()),
    };
    LoadSourceResponse {
        accepted,
        message,
        session: None,
    }
}

/// Per-kind view of the allocator, in kind order.
pub fn list_resources(allocator: &ResourceAllocator) -> Vec<ResourceSnapshot> {
    let stats = allocator.snapshot();
    stats
        .capacity
        .iter()
        .map(|(resource, capacity)| ResourceSnapshot {
            resource: *resource,
            capacity: *capacity,
            available: stats.available.get(resource).copied().unwrap_or(0),
        })
        .collect()
}

/// Return a health payload.
#[must_use]
pub const fn health() -> Health {
    Health { ok: true }
}
