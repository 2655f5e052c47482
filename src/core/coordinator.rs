//! Per-source metadata loading and initialization with at most one session per
//! source.
//!
//! A session is registered under the source name before the crawl is spawned
//! (or the initializer is awaited) and removed by [`SessionGuard`] when that
//! work ends, however it ends.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::metadata::{crawl, LoadProgress, MetaLoader, SourceCatalog, SourceFilter};
use crate::core::{SchedulerError, Spawn};
use crate::util::clock::now_ms;

/// A source the coordinator knows how to load.
pub struct SourceRegistration {
    /// Loader for the source's kind.
    pub loader: Arc<dyn MetaLoader>,
    /// Database and table selection.
    pub filter: SourceFilter,
    /// Concurrent metadata requests during a crawl.
    pub parallelism: usize,
}

impl SourceRegistration {
    /// Registration with an empty filter and one request in flight per CPU.
    #[must_use]
    pub fn new(loader: Arc<dyn MetaLoader>) -> Self {
        Self {
            loader,
            filter: SourceFilter::default(),
            parallelism: num_cpus::get(),
        }
    }

    /// Replace the filter.
    #[must_use]
    pub fn with_filter(mut self, filter: SourceFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Replace the parallelism; zero is raised to one.
    #[must_use]
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }
}

impl std::fmt::Debug for SourceRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistration")
            .field("kind", &self.loader.kind())
            .field("filter", &self.filter)
            .field("parallelism", &self.parallelism)
            .finish()
    }
}

/// Live loading session of one source.
#[derive(Debug)]
struct LoadSession {
    id: Uuid,
    name: String,
    started_at_ms: u128,
    progress: LoadProgress,
}

impl LoadSession {
    fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id,
            source: self.name.clone(),
            started_at_ms: self.started_at_ms,
            progress: self.progress.fraction(),
        }
    }
}

/// Snapshot of a loading session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Session identifier.
    pub id: Uuid,
    /// Source being loaded.
    pub source: String,
    /// Start time in milliseconds since epoch.
    pub started_at_ms: u128,
    /// Progress in `[0, 1]` at snapshot time.
    pub progress: f32,
}

/// Outcome of [`DataSourceCoordinator::try_load`].
#[derive(Debug, Clone, PartialEq)]
pub enum LoadAttempt {
    /// A new session was created and its crawl spawned.
    Started(SessionInfo),
    /// Another session for the same source is running.
    Busy,
}

impl LoadAttempt {
    /// Whether a session was started.
    #[must_use]
    pub const fn is_started(&self) -> bool {
        matches!(self, Self::Started(_))
    }

    /// Turn a busy source into `SchedulerError::SessionBusy`.
    ///
    /// # Errors
    ///
    /// Returns `SessionBusy` naming `source` for [`LoadAttempt::Busy`].
    pub fn into_result(self, source: &str) -> Result<SessionInfo, SchedulerError> {
        match self {
            Self::Started(info) => Ok(info),
            Self::Busy => Err(SchedulerError::SessionBusy(source.to_string())),
        }
    }
}

/// State of a source's initializer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitStatus {
    /// The initializer is running.
    Running,
    /// The last run finished without error.
    Succeeded,
    /// The last run failed or was abandoned.
    Failed,
}

/// Outcome of [`DataSourceCoordinator::try_initialize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitAttempt {
    /// The initializer ran to completion.
    Completed,
    /// A load or another initializer for the same source is running.
    Busy,
}

#[derive(Default)]
struct CoordinatorState {
    sources: RwLock<HashMap<String, Arc<SourceRegistration>>>,
    sessions: Mutex<HashMap<String, Arc<LoadSession>>>,
    errors: Mutex<HashMap<String, String>>,
    catalogs: RwLock<HashMap<String, Arc<SourceCatalog>>>,
    init_statuses: Mutex<HashMap<String, InitStatus>>,
}

/// Marks an initializer run `Running` and settles it when dropped. A run
/// dropped before `finish` counts as failed.
struct InitRun {
    state: Arc<CoordinatorState>,
    name: String,
    outcome: InitStatus,
}

impl InitRun {
    fn start(state: &Arc<CoordinatorState>, name: &str) -> Self {
        state
            .init_statuses
            .lock()
            .insert(name.to_string(), InitStatus::Running);
        Self {
            state: Arc::clone(state),
            name: name.to_string(),
            outcome: InitStatus::Failed,
        }
    }

    fn finish(mut self, outcome: InitStatus) {
        self.outcome = outcome;
    }
}

impl Drop for InitRun {
    fn drop(&mut self) {
        self.state
            .init_statuses
            .lock()
            .insert(self.name.clone(), self.outcome);
    }
}

/// Removes its session from the registry when dropped.
struct SessionGuard {
    state: Arc<CoordinatorState>,
    session: Arc<LoadSession>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.state.sessions.lock().remove(&self.session.name);
        tracing::debug!(source = %self.session.name, session = %self.session.id, "load session released");
    }
}

/// Serializes metadata loads per source and keeps their results.
pub struct DataSourceCoordinator<S> {
    state: Arc<CoordinatorState>,
    spawner: S,
}

impl<S> DataSourceCoordinator<S> {
    /// Coordinator with no registered sources.
    pub fn new(spawner: S) -> Self {
        Self {
            state: Arc::new(CoordinatorState::default()),
            spawner,
        }
    }

    /// Register or replace a source. A running session keeps the registration
    /// it started with.
    pub fn register_source(&self, name: impl Into<String>, registration: SourceRegistration) {
        let name = name.into();
        tracing::info!(source = %name, kind = ?registration.loader.kind(), "data source registered");
        self.state
            .sources
            .write()
            .insert(name, Arc::new(registration));
    }

    /// Whether `name` has been registered.
    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        self.state.sources.read().contains_key(name)
    }

    /// Registered source names, sorted.
    #[must_use]
    pub fn source_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.sources.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Progress in `[0, 1]` of the running session, or `-1.0` when none runs.
    #[must_use]
    pub fn progress(&self, name: &str) -> f32 {
        self.state
            .sessions
            .lock()
            .get(name)
            .map_or(-1.0, |session| session.progress.fraction())
    }

    /// Whether a session for `name` is running.
    #[must_use]
    pub fn is_loading(&self, name: &str) -> bool {
        self.state.sessions.lock().contains_key(name)
    }

    /// Snapshot of the running session, if any.
    #[must_use]
    pub fn session(&self, name: &str) -> Option<SessionInfo> {
        self.state.sessions.lock().get(name).map(|s| s.info())
    }

    /// Error of the most recent failed load, cleared when a new load starts.
    #[must_use]
    pub fn error(&self, name: &str) -> Option<String> {
        self.state.errors.lock().get(name).cloned()
    }

    /// Catalog of the most recent successful load.
    #[must_use]
    pub fn catalog(&self, name: &str) -> Option<Arc<SourceCatalog>> {
        self.state.catalogs.read().get(name).cloned()
    }

    /// Status of the most recent initializer run, `None` if it never ran.
    #[must_use]
    pub fn init_status(&self, name: &str) -> Option<InitStatus> {
        self.state.init_statuses.lock().get(name).copied()
    }

    fn registration(&self, name: &str) -> Result<Arc<SourceRegistration>, SchedulerError> {
        self.state
            .sources
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| SchedulerError::SourceNotRegistered(name.to_string()))
    }

    /// Run the source's initializer unless a load or another initializer for
    /// it is running.
    ///
    /// The initializer holds the source's session slot until it returns, so
    /// [`try_load`](Self::try_load) reports `Busy` meanwhile. The previous
    /// error is cleared first; a failure is recorded like a failed load.
    ///
    /// # Errors
    ///
    /// Returns `SourceNotRegistered` for an unknown `name` and
    /// `InitializerFailed` when the loader's initializer fails.
    pub async fn try_initialize(&self, name: &str) -> Result<InitAttempt, SchedulerError> {
        let source = self.registration(name)?;
        let Some(guard) = self.try_acquire(name) else {
            tracing::info!(source = %name, "initializer not started, source is busy");
            return Ok(InitAttempt::Busy);
        };
        self.state.errors.lock().remove(name);
        let run = InitRun::start(&self.state, name);
        tracing::info!(source = %name, session = %guard.session.id, "initializer started");

        let outcome = source.loader.run_initializer().await;
        match outcome {
            Ok(()) => {
                run.finish(InitStatus::Succeeded);
                tracing::info!(source = %name, "initializer finished");
                Ok(InitAttempt::Completed)
            }
            Err(err) => {
                let reason = format!("{err:#}");
                self.state
                    .errors
                    .lock()
                    .insert(name.to_string(), format!("failed: {reason}"));
                run.finish(InitStatus::Failed);
                let failure = SchedulerError::InitializerFailed {
                    source_name: name.to_string(),
                    reason,
                };
                tracing::error!(error = %failure, "initializer failed");
                Err(failure)
            }
        }
    }

    fn try_acquire(&self, name: &str) -> Option<SessionGuard> {
        let mut sessions = self.state.sessions.lock();
        if sessions.contains_key(name) {
            return None;
        }
        let session = Arc::new(LoadSession {
            id: Uuid::new_v4(),
            name: name.to_string(),
            started_at_ms: now_ms(),
            progress: LoadProgress::new(),
        });
        sessions.insert(name.to_string(), Arc::clone(&session));
        Some(SessionGuard {
            state: Arc::clone(&self.state),
            session,
        })
    }
}

impl<S: Spawn> DataSourceCoordinator<S> {
    /// Start loading `name` unless a load or initializer for it is running.
    ///
    /// Check and registration of the session are one atomic step, so of two
    /// concurrent callers exactly one gets `Started`. The crawl runs detached;
    /// its outcome is visible through [`catalog`](Self::catalog) and
    /// [`error`](Self::error).
    ///
    /// # Errors
    ///
    /// Returns `SourceNotRegistered` when `name` was never registered.
    pub fn try_load(&self, name: &str) -> Result<LoadAttempt, SchedulerError> {
        let source = self.registration(name)?;

        let Some(guard) = self.try_acquire(name) else {
            tracing::info!(source = %name, "data source is already being loaded");
            return Ok(LoadAttempt::Busy);
        };
        self.state.errors.lock().remove(name);
        let info = guard.session.info();
        tracing::info!(source = %name, session = %info.id, "metadata load started");

        self.spawner.spawn(async move {
            let session = Arc::clone(&guard.session);
            let outcome = crawl(
                source.loader.as_ref(),
                &source.filter,
                source.parallelism,
                &session.progress,
            )
            .await;
            match outcome {
                Ok(catalog) => {
                    tracing::info!(source = %session.name, session = %session.id, "metadata load finished");
                    guard
                        .state
                        .catalogs
                        .write()
                        .insert(session.name.clone(), Arc::new(catalog));
                }
                Err(err) => {
                    let reason = format!("{err:#}");
                    let failure = SchedulerError::LoadFailure {
                        source_name: session.name.clone(),
                        reason: reason.clone(),
                    };
                    tracing::error!(session = %session.id, error = %failure, "metadata load failed");
                    guard
                        .state
                        .errors
                        .lock()
                        .insert(session.name.clone(), format!("failed: {reason}"));
                }
            }
            drop(guard);
        });
        Ok(LoadAttempt::Started(info))
    }
}

impl<S> std::fmt::Debug for DataSourceCoordinator<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSourceCoordinator")
            .field("sources", &self.source_names())
            .field("sessions", &self.state.sessions.lock().len())
            .finish_non_exhaustive()
    }
}
