//! Configuration models for capacities, sequences, reconciliation and sources.

pub mod orchestrator;

pub use orchestrator::{
    OrchestratorConfig, ReconcileConfig, SequenceConfig, SourceConfig, CONFIG_PATH_ENV,
};
