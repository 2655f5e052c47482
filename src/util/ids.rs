//! Identifier aliases shared across components.

/// Identifier of a migration job (top-level or sub-job).
pub type JobId = u64;

/// Identifier of a leaf migration task.
pub type TaskId = u64;
