//! In-memory job status store for development and tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::core::{JobStatus, JobStatusBatch, JobStatusStore, SchedulerError, TaskSnapshot, TaskStatus};
use crate::util::{JobId, TaskId};

/// Tasks and committed job statuses held in process memory.
///
/// The store can be switched offline to exercise the reconciler's retry path.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    tasks: RwLock<BTreeMap<TaskId, TaskSnapshot>>,
    jobs: RwLock<BTreeMap<JobId, JobStatus>>,
    commits: AtomicUsize,
    offline: AtomicBool,
}

impl InMemoryJobStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a task.
    pub fn upsert_task(&self, task: TaskSnapshot) {
        self.tasks.write().insert(task.task_id, task);
    }

    /// Move a task to a new phase, as its executor would. Returns false for an
    /// unknown task.
    pub fn set_task_status(&self, task_id: TaskId, status: TaskStatus) -> bool {
        self.tasks
            .write()
            .get_mut(&task_id)
            .map(|task| task.status = status)
            .is_some()
    }

    /// Raise or clear a task's stop flag. Returns false for an unknown task.
    pub fn set_stopped(&self, task_id: TaskId, stopped: bool) -> bool {
        self.tasks
            .write()
            .get_mut(&task_id)
            .map(|task| task.stopped = stopped)
            .is_some()
    }

    /// Last committed status of a job.
    #[must_use]
    pub fn job_status(&self, job_id: JobId) -> Option<JobStatus> {
        self.jobs.read().get(&job_id).copied()
    }

    /// Number of successful batch commits.
    #[must_use]
    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Make every call fail with `SchedulerError::Backend` while set.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> Result<(), SchedulerError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SchedulerError::Backend("job store offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl JobStatusStore for InMemoryJobStore {
    async fn task_snapshots(&self, job_ids: &[JobId]) -> Result<Vec<TaskSnapshot>, SchedulerError> {
        self.ensure_online()?;
        let tasks = self.tasks.read();
        Ok(tasks
            .values()
            .filter(|task| job_ids.is_empty() || job_ids.contains(&task.job_id))
            .copied()
            .collect())
    }

    async fn commit_job_statuses(&self, batch: &JobStatusBatch) -> Result<(), SchedulerError> {
        self.ensure_online()?;
        let mut jobs = self.jobs.write();
        jobs.extend(batch.iter());
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
