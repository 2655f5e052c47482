//! Error types for scheduler operations.

use thiserror::Error;

use crate::core::Resource;

/// Errors produced by scheduler components.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A requested resource kind had no availability; nothing was allocated.
    #[error("resource exhausted for {action_id}: run out of {resource}")]
    ResourceExhausted {
        /// Action that asked for the resources.
        action_id: String,
        /// First kind found with zero availability.
        resource: Resource,
    },
    /// A metadata load for this source is already in flight.
    #[error("{0} is being loaded")]
    SessionBusy(String),
    /// The source name was never registered with the coordinator.
    #[error("{0} has not been added")]
    SourceNotRegistered(String),
    /// A metadata loader reported a failure.
    #[error("failed to load {source_name}: {reason}")]
    LoadFailure {
        /// Source whose load failed.
        source_name: String,
        /// Loader-provided failure description.
        reason: String,
    },
    /// A source initializer reported a failure.
    #[error("failed to run {source_name} initializer: {reason}")]
    InitializerFailed {
        /// Source whose initializer failed.
        source_name: String,
        /// Loader-provided failure description.
        reason: String,
    },
    /// The durable counter backing a sequence could not be read or advanced.
    #[error("sequence fetch failed: {0}")]
    SequenceFetch(String),
    /// A status distribution that has no defined aggregate.
    #[error("illegal status combination: {0}")]
    IllegalStatusCombination(String),
    /// A partition value declared numeric did not parse as a number.
    #[error("partition value `{value}` is not numeric")]
    InvalidPartitionValue {
        /// Offending value.
        value: String,
    },
    /// Configuration failed validation.
    #[error("config invalid: {0}")]
    Config(String),
    /// Backend-specific failure with context.
    #[error("backend error: {0}")]
    Backend(String),
    /// A background component has stopped accepting work.
    #[error("{0} has shut down")]
    Shutdown(&'static str),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
