//! # Migration Scheduler
//!
//! Scheduling and concurrency-coordination core for a data-migration engine that
//! moves database and table objects from external source systems into a target
//! warehouse.
//!
//! A migration job is split into tasks (one per table or partition). This crate
//! decides when those tasks may run and what status their jobs report; the actual
//! data movement, SQL generation and source protocol clients are external
//! executors that only report success or failure.
//!
//! ## Components
//!
//! - **`ResourceAllocator`**: fixed-capacity multi-resource pool with partial-grant
//!   semantics. Dispatch consults it before starting a task.
//! - **`SequenceAllocator`**: cached block allocation of monotonically increasing
//!   identifiers backed by a durable counter.
//! - **`DataSourceCoordinator`**: single-flight metadata loads per source name,
//!   with progress and last-error tracking.
//! - **Status aggregation**: pure rollup of task phases into job status, of
//!   sub-job statuses into a parent status, and of catalog objects upward.
//! - **`PartitionRangeFilter`**: ordering-aware range test over partition tuples.
//! - **`ReconciliationScheduler`**: periodic drain of task-completion signals that
//!   recomputes and commits affected job statuses in one batch.
//!
//! ## Wiring
//!
//! Everything is constructed explicitly and owned by the process entry point:
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use migration_scheduler::builders::build_context;
//! use migration_scheduler::config::OrchestratorConfig;
//! use migration_scheduler::infra::{InMemoryCounter, InMemoryJobStore};
//! use migration_scheduler::runtime::TokioSpawner;
//!
//! let cfg = OrchestratorConfig::from_env()?;
//! let ctx = build_context(
//!     &cfg,
//!     Arc::new(InMemoryCounter::new()),
//!     Arc::new(InMemoryJobStore::new()),
//!     |source| loaders.for_kind(source.kind),
//!     TokioSpawner::new(tokio::runtime::Handle::current()),
//! )?;
//!
//! let job_id = ctx.job_ids.next_id()?;
//! let dispatcher = ctx.dispatcher(my_executor);
//! match dispatcher.dispatch(request) {
//!     DispatchOutcome::Started { granted } => tracing::info!(?granted, "running"),
//!     DispatchOutcome::Deferred { resource } => tracing::info!(%resource, "retry later"),
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions: allocation, identifiers, coordination and status.
pub mod core;
/// Configuration models for resources, sequences, reconciliation and sources.
pub mod config;
/// Builders that assemble the orchestration context from configuration.
pub mod builders;
/// Infrastructure adapters for durable counters and job-status stores.
pub mod infra;
/// Runtime adapters, task dispatch and the API-facing surface.
pub mod runtime;
/// Shared utilities.
pub mod util;
