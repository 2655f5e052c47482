//! Status algebra for tasks, jobs, sub-jobs and catalog objects.
//!
//! Everything here is a pure function over in-memory snapshots; nothing in this
//! module mutates stored state. The reconciler drives the task and job rollups.
//! The sub-job and catalog-object rollups ([`rollup_sub_jobs`],
//! [`rollup_catalog_objects`]) are helpers for the persistence layer, which
//! calls them when it writes parent jobs and catalog objects.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::SchedulerError;
use crate::util::{JobId, TaskId};

/// Phase of a migration task.
///
/// Happy path: `Init -> SchemaDoing -> SchemaDone -> DataDoing -> DataDone ->
/// VerificationDoing -> VerificationDone -> Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Created, not started (or reset by a stop).
    Init,
    /// Creating the target schema.
    SchemaDoing,
    /// Target schema created.
    SchemaDone,
    /// Schema creation failed.
    SchemaFailed,
    /// Moving data.
    DataDoing,
    /// Data moved.
    DataDone,
    /// Data movement failed.
    DataFailed,
    /// Verifying source against target.
    VerificationDoing,
    /// Verification passed.
    VerificationDone,
    /// Verification failed.
    VerificationFailed,
    /// Task finished.
    Done,
}

impl TaskStatus {
    /// The failure phase reached when a task fails while in `self`.
    ///
    /// Statuses outside the doing/done chain map to themselves.
    #[must_use]
    pub const fn fail_status(self) -> Self {
        match self {
            Self::Init | Self::SchemaDoing => Self::SchemaFailed,
            Self::SchemaDone | Self::DataDoing => Self::DataFailed,
            Self::DataDone | Self::VerificationDoing => Self::VerificationFailed,
            other => other,
        }
    }

    /// Whether the task is somewhere between its first phase and `Done`.
    #[must_use]
    pub const fn is_in_progress(self) -> bool {
        matches!(
            self,
            Self::SchemaDoing
                | Self::SchemaDone
                | Self::DataDoing
                | Self::DataDone
                | Self::VerificationDoing
                | Self::VerificationDone
        )
    }

    /// Whether the task ended in a failure phase.
    #[must_use]
    pub const fn is_failed(self) -> bool {
        matches!(
            self,
            Self::SchemaFailed | Self::DataFailed | Self::VerificationFailed
        )
    }

    /// Whether the task can no longer change on its own.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        self.is_failed() || matches!(self, Self::Done)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "INIT",
            Self::SchemaDoing => "SCHEMA_DOING",
            Self::SchemaDone => "SCHEMA_DONE",
            Self::SchemaFailed => "SCHEMA_FAILED",
            Self::DataDoing => "DATA_DOING",
            Self::DataDone => "DATA_DONE",
            Self::DataFailed => "DATA_FAILED",
            Self::VerificationDoing => "VERIFICATION_DOING",
            Self::VerificationDone => "VERIFICATION_DONE",
            Self::VerificationFailed => "VERIFICATION_FAILED",
            Self::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// Status of a job whose children are tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Submitted, not yet reconciled.
    Init,
    /// At least one task is in progress.
    Doing,
    /// Nothing in progress and at least one task failed.
    Failed,
    /// Nothing in progress or failed and at least one task stopped.
    Stopped,
    /// Every task finished.
    Done,
}

/// Observed state of one task, as loaded for reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    /// Task identifier.
    pub task_id: TaskId,
    /// Owning job.
    pub job_id: JobId,
    /// Current phase.
    pub status: TaskStatus,
    /// Out-of-band stop flag; a stopped task counts as `Init` for rollup.
    pub stopped: bool,
}

impl TaskSnapshot {
    /// Status used for rollup.
    #[must_use]
    pub const fn effective_status(&self) -> TaskStatus {
        if self.stopped {
            TaskStatus::Init
        } else {
            self.status
        }
    }
}

/// Aggregate a job's status from its tasks' effective statuses.
///
/// Precedence is DOING > FAILED > STOPPED > DONE. A task in `Init` (whether
/// stopped or never started) makes the job STOPPED unless something outranks it.
pub fn rollup_job<I>(statuses: I) -> JobStatus
where
    I: IntoIterator<Item = TaskStatus>,
{
    let mut failed = false;
    let mut stopped = false;
    for status in statuses {
        if status.is_in_progress() {
            return JobStatus::Doing;
        }
        failed |= status.is_failed();
        stopped |= status == TaskStatus::Init;
    }
    if failed {
        JobStatus::Failed
    } else if stopped {
        JobStatus::Stopped
    } else {
        JobStatus::Done
    }
}

/// Group task snapshots by owning job and aggregate each job.
pub fn rollup_tasks<'a, I>(tasks: I) -> BTreeMap<JobId, JobStatus>
where
    I: IntoIterator<Item = &'a TaskSnapshot>,
{
    let mut by_job: BTreeMap<JobId, Vec<TaskStatus>> = BTreeMap::new();
    for task in tasks {
        by_job
            .entry(task.job_id)
            .or_default()
            .push(task.effective_status());
    }
    by_job
        .into_iter()
        .map(|(job_id, statuses)| (job_id, rollup_job(statuses)))
        .collect()
}

/// Job ids grouped by aggregate status, committed as one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusBatch {
    /// Jobs with work in progress.
    pub doing: Vec<JobId>,
    /// Jobs with a failed task.
    pub failed: Vec<JobId>,
    /// Jobs with a stopped task.
    pub stopped: Vec<JobId>,
    /// Jobs whose tasks all finished.
    pub done: Vec<JobId>,
}

impl JobStatusBatch {
    /// Aggregate task snapshots and group the resulting job ids.
    pub fn from_tasks<'a, I>(tasks: I) -> Self
    where
        I: IntoIterator<Item = &'a TaskSnapshot>,
    {
        let mut batch = Self::default();
        for (job_id, status) in rollup_tasks(tasks) {
            batch.push(job_id, status);
        }
        batch
    }

    /// Add one job under its status. `JobStatus::Init` is never produced by a
    /// rollup and is ignored.
    pub fn push(&mut self, job_id: JobId, status: JobStatus) {
        match status {
            JobStatus::Doing => self.doing.push(job_id),
            JobStatus::Failed => self.failed.push(job_id),
            JobStatus::Stopped => self.stopped.push(job_id),
            JobStatus::Done => self.done.push(job_id),
            JobStatus::Init => {}
        }
    }

    /// Number of jobs in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.doing.len() + self.failed.len() + self.stopped.len() + self.done.len()
    }

    /// Whether the batch holds no jobs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate `(job, status)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (JobId, JobStatus)> + '_ {
        Self::tagged(&self.doing, JobStatus::Doing)
            .chain(Self::tagged(&self.failed, JobStatus::Failed))
            .chain(Self::tagged(&self.stopped, JobStatus::Stopped))
            .chain(Self::tagged(&self.done, JobStatus::Done))
    }

    fn tagged(ids: &[JobId], status: JobStatus) -> impl Iterator<Item = (JobId, JobStatus)> + '_ {
        ids.iter().map(move |id| (*id, status))
    }
}

/// Status of a job in the sub-job hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubJobStatus {
    /// Finished successfully.
    Succeeded,
    /// Finished with a failure.
    Failed,
    /// Waiting to run.
    Pending,
    /// Running.
    Running,
    /// Canceled by a user.
    Canceled,
}

/// Count of children per sub-job status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusDistribution {
    /// Children in `Succeeded`.
    pub succeeded: usize,
    /// Children in `Failed`.
    pub failed: usize,
    /// Children in `Pending`.
    pub pending: usize,
    /// Children in `Running`.
    pub running: usize,
    /// Children in `Canceled`.
    pub canceled: usize,
}

impl StatusDistribution {
    /// Count a set of child statuses.
    pub fn count<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = SubJobStatus>,
    {
        let mut dist = Self::default();
        for status in statuses {
            match status {
                SubJobStatus::Succeeded => dist.succeeded += 1,
                SubJobStatus::Failed => dist.failed += 1,
                SubJobStatus::Pending => dist.pending += 1,
                SubJobStatus::Running => dist.running += 1,
                SubJobStatus::Canceled => dist.canceled += 1,
            }
        }
        dist
    }

    /// Total number of children.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.succeeded + self.failed + self.pending + self.running + self.canceled
    }
}

impl fmt::Display for StatusDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{SUCCEEDED={}, FAILED={}, PENDING={}, RUNNING={}, CANCELED={}}}",
            self.succeeded, self.failed, self.pending, self.running, self.canceled
        )
    }
}

/// Aggregate a parent's status from its sub-jobs.
///
/// Only the enumerated distributions have an aggregate; anything else is
/// reported rather than guessed.
///
/// # Errors
///
/// Returns `SchedulerError::IllegalStatusCombination` for an empty child set,
/// for CANCELED mixed with any other status, and for any distribution the
/// table below does not cover.
pub fn rollup_sub_jobs(children: &[SubJobStatus]) -> Result<SubJobStatus, SchedulerError> {
    let dist = StatusDistribution::count(children.iter().copied());
    let total = dist.total();
    if total == 0 {
        return Err(SchedulerError::IllegalStatusCombination(
            "no sub jobs to aggregate".into(),
        ));
    }

    if dist.canceled == total {
        return Ok(SubJobStatus::Canceled);
    }
    if dist.canceled != 0 {
        return Err(SchedulerError::IllegalStatusCombination(format!(
            "canceled mixed with other sub job statuses: {dist}"
        )));
    }

    if dist.succeeded == total {
        Ok(SubJobStatus::Succeeded)
    } else if dist.pending == total {
        Ok(SubJobStatus::Pending)
    } else if dist.running > 0 {
        Ok(SubJobStatus::Running)
    } else if dist.pending > 0 {
        Ok(SubJobStatus::Pending)
    } else if dist.succeeded + dist.failed + dist.canceled == total && dist.failed > 0 {
        Ok(SubJobStatus::Failed)
    } else {
        Err(SchedulerError::IllegalStatusCombination(dist.to_string()))
    }
}

/// Effective status of a parent job given its own recorded status and its
/// sub-jobs.
///
/// A parent already FAILED or CANCELED keeps that status; a parent with no
/// sub-jobs keeps its own status; otherwise the sub-job rollup decides.
///
/// # Errors
///
/// Propagates `IllegalStatusCombination` from [`rollup_sub_jobs`].
pub fn resolve_parent_status(
    own: SubJobStatus,
    children: &[SubJobStatus],
) -> Result<SubJobStatus, SchedulerError> {
    if matches!(own, SubJobStatus::Failed | SubJobStatus::Canceled) || children.is_empty() {
        return Ok(own);
    }
    let aggregated = rollup_sub_jobs(children)?;
    if aggregated != own {
        tracing::info!(?own, ?aggregated, "correcting parent job status from sub jobs");
    }
    Ok(aggregated)
}

/// Migration status of a catalog object (database, table or partition).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MigrationStatus {
    /// Not migrated.
    Init,
    /// Migration running.
    Doing,
    /// Fully migrated.
    Done,
    /// Migration failed.
    Failed,
    /// Some children migrated, some not.
    PartDone,
}

/// Aggregate a catalog object's status from its children.
///
/// DOING > FAILED > PART_DONE; all DONE is DONE, DONE mixed with INIT is
/// PART_DONE, and anything else (including no children) is INIT.
pub fn rollup_migration<I>(children: I) -> MigrationStatus
where
    I: IntoIterator<Item = MigrationStatus>,
{
    let (mut doing, mut failed, mut part_done, mut done, mut init) =
        (false, false, false, false, false);
    for status in children {
        match status {
            MigrationStatus::Doing => doing = true,
            MigrationStatus::Failed => failed = true,
            MigrationStatus::PartDone => part_done = true,
            MigrationStatus::Done => done = true,
            MigrationStatus::Init => init = true,
        }
    }

    if doing {
        MigrationStatus::Doing
    } else if failed {
        MigrationStatus::Failed
    } else if part_done || (done && init) {
        MigrationStatus::PartDone
    } else if done {
        MigrationStatus::Done
    } else {
        MigrationStatus::Init
    }
}

/// Aggregate `(parent id, child status)` rows into one status per parent, e.g.
/// partitions into tables or tables into databases.
pub fn rollup_catalog_objects<I>(rows: I) -> BTreeMap<u64, MigrationStatus>
where
    I: IntoIterator<Item = (u64, MigrationStatus)>,
{
    let mut by_parent: BTreeMap<u64, Vec<MigrationStatus>> = BTreeMap::new();
    for (parent, status) in rows {
        by_parent.entry(parent).or_default().push(status);
    }
    by_parent
        .into_iter()
        .map(|(parent, statuses)| (parent, rollup_migration(statuses)))
        .collect()
}
