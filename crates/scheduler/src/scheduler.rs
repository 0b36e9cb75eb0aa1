//! The job scheduler and its reconciliation loop.
//!
//! [`Scheduler`] owns the job registry behind a single `std::sync::Mutex`.
//! Every mutating call (`add`, `update`, `remove`, `start_processing`, and
//! the mutation operations) ends by running [`reconcile`] under that lock,
//! so each call is atomic with respect to every other and no two
//! reconciliation passes can pick the same queued job.
//!
//! Reconciliation never awaits. It marks the jobs it picks `preprocessing`
//! while still holding the lock, then the caller spawns their processors
//! as detached Tokio tasks once the lock is released. Those processors
//! report back through [`JobUpdater`], which calls [`Scheduler::update`]
//! and thereby re-runs reconciliation. The cycle sustains itself until
//! nothing is queued or active, at which point processing switches off.
//!
//! Dispatched processors cannot be cancelled. Removing or requeueing a job
//! does not stop a processor that is already running for it; its later
//! updates either fail with [`SchedulerError::JobNotFound`] (removed) or
//! still land on the job (requeued).
//!
//! [`reconcile`]: Scheduler::reconcile

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use atelier_core::job::{Job, JobPatch, JobSubmission};
use atelier_core::job_events::{
    EVENT_JOB_COMPLETED, EVENT_JOB_DISPATCHED, EVENT_JOB_FAILED, EVENT_JOB_PROGRESS,
    EVENT_JOB_QUEUED, EVENT_JOB_REMOVED, EVENT_SCHEDULER_IDLE, EVENT_SCHEDULER_STARTED,
};
use atelier_core::mode::Mode;
use atelier_core::status::JobStatus;
use atelier_core::types::JobId;
use atelier_events::{EventBus, JobEvent};
use tokio::sync::broadcast;
use tracing::Instrument;

use crate::dispatcher::{ModeDispatcher, ModeRoute};
use crate::error::{SchedulerError, SchedulerResult};
use crate::processor::JobUpdater;
use crate::registry::{JobRegistry, StatusCounts};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Everything guarded by the scheduler lock.
#[derive(Debug, Default)]
pub(crate) struct SchedulerState {
    pub(crate) registry: JobRegistry,
    /// Whether the reconciliation loop may dispatch. Cleared automatically
    /// once nothing is queued or active.
    pub(crate) processing: bool,
    /// Set by the first [`Scheduler::seed`] call.
    pub(crate) initialized: bool,
}

/// A job picked by reconciliation, waiting to be spawned.
pub(crate) struct Dispatch {
    job: Job,
    route: ModeRoute,
}

struct Inner {
    state: Mutex<SchedulerState>,
    dispatcher: ModeDispatcher,
    events: Arc<EventBus>,
    /// Spawned processor and regeneration tasks that have not finished yet.
    in_flight: AtomicUsize,
}

/// Decrements the in-flight counter when a spawned task ends, panics
/// included.
struct InFlightGuard(Arc<Inner>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Bounded-concurrency job scheduler. Cheap to clone; clones share state.
///
/// Must be used from within a Tokio runtime: dispatching spawns tasks.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("modes", &self.inner.dispatcher.modes())
            .field("in_flight", &self.in_flight_tasks())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    pub fn new(dispatcher: ModeDispatcher, events: Arc<EventBus>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(SchedulerState::default()),
                dispatcher,
                events,
                in_flight: AtomicUsize::new(0),
            }),
        }
    }

    pub fn dispatcher(&self) -> &ModeDispatcher {
        &self.inner.dispatcher
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.events.subscribe()
    }

    // ---- job collection --------------------------------------------------

    /// Append jobs in arrival order and reconcile.
    ///
    /// All submissions are validated before any is inserted; one invalid
    /// submission rejects the whole batch.
    pub fn add(&self, submissions: Vec<JobSubmission>) -> SchedulerResult<Vec<JobId>> {
        let jobs = submissions
            .into_iter()
            .map(Job::from_submission)
            .collect::<Result<Vec<_>, _>>()?;

        let (ids, dispatches) = {
            let mut state = self.lock();
            let ids = self.insert_jobs(&mut state, jobs);
            let dispatches = self.reconcile(&mut state);
            (ids, dispatches)
        };
        self.spawn_all(dispatches);
        Ok(ids)
    }

    /// Accept the initial batch of externally supplied jobs exactly once.
    ///
    /// Returns `false` (and inserts nothing) if the scheduler was already
    /// seeded.
    pub fn seed(&self, submissions: Vec<JobSubmission>) -> SchedulerResult<bool> {
        let jobs = submissions
            .into_iter()
            .map(Job::from_submission)
            .collect::<Result<Vec<_>, _>>()?;

        let dispatches = {
            let mut state = self.lock();
            if state.initialized {
                tracing::debug!("Scheduler already seeded; ignoring initial batch");
                return Ok(false);
            }
            state.initialized = true;
            let ids = self.insert_jobs(&mut state, jobs);
            tracing::info!(count = ids.len(), "Seeded scheduler with initial jobs");
            self.reconcile(&mut state)
        };
        self.spawn_all(dispatches);
        Ok(true)
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().initialized
    }

    /// Merge a status change and partial fields into a job, then reconcile.
    ///
    /// Only reconciliation may move a job into an active status from
    /// `queued`, and completed or failed jobs only re-enter the active set
    /// through the mutation operations, so both transitions are rejected
    /// here. Any job may be requeued or finished.
    pub fn update(&self, id: JobId, status: JobStatus, patch: JobPatch) -> SchedulerResult<()> {
        let dispatches = {
            let mut state = self.lock();
            let job = state
                .registry
                .get_mut(&id)
                .ok_or(SchedulerError::JobNotFound(id))?;

            if status.is_active() && !job.status.is_active() {
                tracing::warn!(
                    job_id = %id,
                    from = %job.status,
                    to = %status,
                    "Rejected update into active status",
                );
                return Err(SchedulerError::InvalidTransition {
                    id,
                    from: job.status,
                    to: status,
                });
            }
            if let Some(ref output) = patch.output {
                if output.mode() != job.mode {
                    return Err(SchedulerError::OutputModeMismatch {
                        id,
                        expected: job.mode,
                        actual: output.mode(),
                    });
                }
            }

            job.apply(status, patch);
            log_status_change(job);
            self.inner
                .events
                .publish(JobEvent::new(event_type_for(status)).for_job(job));

            self.reconcile(&mut state)
        };
        self.spawn_all(dispatches);
        Ok(())
    }

    /// Drop a job from the registry. A processor still running for it is
    /// not stopped.
    pub fn remove(&self, id: JobId) -> SchedulerResult<Job> {
        let (job, dispatches) = {
            let mut state = self.lock();
            let job = state
                .registry
                .remove(&id)
                .ok_or(SchedulerError::JobNotFound(id))?;
            if job.status.is_active() {
                tracing::warn!(
                    job_id = %id,
                    status = %job.status,
                    "Removed job while its processor is still running",
                );
            } else {
                tracing::info!(job_id = %id, "Removed job");
            }
            self.inner
                .events
                .publish(JobEvent::new(EVENT_JOB_REMOVED).for_job(&job));
            let dispatches = self.reconcile(&mut state);
            (job, dispatches)
        };
        self.spawn_all(dispatches);
        Ok(job)
    }

    pub fn get(&self, id: JobId) -> Option<Job> {
        self.lock().registry.get(&id).cloned()
    }

    /// Snapshot of every job in insertion order.
    pub fn list(&self) -> Vec<Job> {
        self.lock().registry.iter().cloned().collect()
    }

    /// Snapshot of the jobs matching `predicate`, in insertion order.
    pub fn query<P>(&self, predicate: P) -> Vec<Job>
    where
        P: Fn(&Job) -> bool,
    {
        self.lock()
            .registry
            .iter()
            .filter(|job| predicate(*job))
            .cloned()
            .collect()
    }

    pub fn counts(&self) -> StatusCounts {
        self.lock().registry.counts()
    }

    // ---- processing flag -------------------------------------------------

    /// Enable processing and reconcile immediately.
    pub fn start_processing(&self) {
        let dispatches = {
            let mut state = self.lock();
            self.enable_processing(&mut state);
            self.reconcile(&mut state)
        };
        self.spawn_all(dispatches);
    }

    /// Stop dispatching new jobs. Processors already running continue.
    pub fn stop_processing(&self) {
        let mut state = self.lock();
        if state.processing {
            state.processing = false;
            tracing::info!("Processing stopped");
        }
    }

    pub fn is_processing(&self) -> bool {
        self.lock().processing
    }

    /// Spawned processor and regeneration tasks still running.
    pub fn in_flight_tasks(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    // ---- reconciliation --------------------------------------------------

    /// Decide which queued jobs to dispatch and whether processing is done.
    ///
    /// For every mode with queued jobs (ordered by that mode's oldest queued
    /// job), dispatch up to `limit - active` of them, oldest first. Each
    /// picked job is marked `preprocessing` before this returns. Afterwards,
    /// if nothing is queued or active, the processing flag is cleared.
    pub(crate) fn reconcile(&self, state: &mut SchedulerState) -> Vec<Dispatch> {
        if !state.processing {
            return Vec::new();
        }

        let mut dispatches = Vec::new();
        for mode in state.registry.queued_modes() {
            let Some(route) = self.inner.dispatcher.resolve(mode) else {
                self.fail_unroutable(state, mode);
                continue;
            };

            let active = state.registry.active_count(mode);
            if active >= route.concurrency_limit {
                tracing::trace!(
                    %mode,
                    active,
                    limit = route.concurrency_limit,
                    "Mode at capacity",
                );
                continue;
            }

            let available = route.concurrency_limit - active;
            for id in state.registry.next_queued(mode, available) {
                let Some(job) = state.registry.get_mut(&id) else {
                    continue;
                };
                job.attempts += 1;
                job.progress = None;
                job.progress_message = None;
                job.apply(JobStatus::Preprocessing, JobPatch::new());

                tracing::info!(
                    job_id = %id,
                    %mode,
                    attempt = job.attempts,
                    "Dispatching job",
                );
                self.inner
                    .events
                    .publish(JobEvent::new(EVENT_JOB_DISPATCHED).for_job(job));

                dispatches.push(Dispatch {
                    job: job.clone(),
                    route: route.clone(),
                });
            }
        }

        if state.registry.counts().is_idle() {
            state.processing = false;
            tracing::info!("No queued or active jobs remain; processing idle");
            self.inner.events.publish(JobEvent::new(EVENT_SCHEDULER_IDLE));
        }

        dispatches
    }

    /// Fail every queued job of a mode that has no processor, instead of
    /// leaving them queued forever.
    fn fail_unroutable(&self, state: &mut SchedulerState, mode: Mode) {
        let ids = state.registry.next_queued(mode, usize::MAX);
        for id in ids {
            let error = SchedulerError::NoProcessor(mode).to_string();
            if let Some(job) = state
                .registry
                .update(&id, JobStatus::Failed, JobPatch::new().error(error))
            {
                tracing::error!(job_id = %id, %mode, "No processor registered for mode");
                self.inner
                    .events
                    .publish(JobEvent::new(EVENT_JOB_FAILED).for_job(job));
            }
        }
    }

    // ---- crate helpers ---------------------------------------------------

    pub(crate) fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        // Critical sections never panic midway, so a poisoned guard still
        // holds consistent state.
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn enable_processing(&self, state: &mut SchedulerState) {
        if !state.processing {
            state.processing = true;
            tracing::info!("Processing started");
            self.inner.events.publish(JobEvent::new(EVENT_SCHEDULER_STARTED));
        }
    }

    pub(crate) fn publish(&self, event: JobEvent) {
        self.inner.events.publish(event);
    }

    fn insert_jobs(&self, state: &mut SchedulerState, jobs: Vec<Job>) -> Vec<JobId> {
        let mut ids = Vec::with_capacity(jobs.len());
        for job in jobs {
            tracing::debug!(
                job_id = %job.id,
                mode = %job.mode,
                status = %job.status,
                "Job added",
            );
            self.inner
                .events
                .publish(JobEvent::new(EVENT_JOB_QUEUED).for_job(&job));
            ids.push(job.id);
            state.registry.insert(job);
        }
        ids
    }

    pub(crate) fn spawn_all(&self, dispatches: Vec<Dispatch>) {
        for dispatch in dispatches {
            self.spawn_dispatch(dispatch);
        }
    }

    /// Run a processor as a detached task. The loop never joins it.
    fn spawn_dispatch(&self, dispatch: Dispatch) {
        let Dispatch { job, route } = dispatch;
        let span = tracing::info_span!("processor", job_id = %job.id, mode = %job.mode);
        let updater = JobUpdater::new(self.clone());
        self.spawn_tracked(
            async move {
                route.processor.process(job, route.config, updater).await;
            }
            .instrument(span),
        );
    }

    /// Spawn a detached task counted in [`in_flight_tasks`](Self::in_flight_tasks).
    pub(crate) fn spawn_tracked<F>(&self, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = InFlightGuard(Arc::clone(&self.inner));
        tokio::spawn(async move {
            let _guard = guard;
            future.await;
        });
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn event_type_for(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Completed => EVENT_JOB_COMPLETED,
        JobStatus::Failed => EVENT_JOB_FAILED,
        JobStatus::Queued => EVENT_JOB_QUEUED,
        _ => EVENT_JOB_PROGRESS,
    }
}

fn log_status_change(job: &Job) {
    match job.status {
        JobStatus::Completed => {
            tracing::info!(job_id = %job.id, mode = %job.mode, "Job completed");
        }
        JobStatus::Failed => {
            tracing::error!(
                job_id = %job.id,
                mode = %job.mode,
                error = job.error.as_deref().unwrap_or("unknown error"),
                "Job failed",
            );
        }
        status => {
            tracing::debug!(
                job_id = %job.id,
                mode = %job.mode,
                %status,
                progress = job.progress,
                message = job.progress_message.as_deref(),
                "Job status update",
            );
        }
    }
}
