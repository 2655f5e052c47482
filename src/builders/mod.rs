//! Builders that assemble the orchestration context from configuration.

pub mod context_builder;

pub use context_builder::{build_context, OrchestratorContext, JOB_SEQUENCE, TASK_SEQUENCE};
