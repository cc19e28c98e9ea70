//! Per-queue job runner with admission checks, persistence, timeouts and retry.
//!
//! A runner owns one or more job types. Jobs of those types are persisted on
//! admission, executed one at a time in due-time order (ties broken by
//! insertion order), and either removed or rescheduled depending on the
//! outcome. Different runners never share a lock and execute independently.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use taskmill_core::{Clock, JobId};

use super::codec::JobTypeRegistry;
use super::store::JobStore;
use super::types::{
    AdmissionDecision, JobContext, PersistedJobRecord, RetryDecision, RunOutcome, ScheduledJob,
};

/// Runner configuration: queue name plus the job types it owns.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub name: String,
    pub job_types: Vec<&'static str>,
}

impl RunnerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            job_types: Vec::new(),
        }
    }

    pub fn owning(mut self, job_type: &'static str) -> Self {
        if !self.job_types.contains(&job_type) {
            self.job_types.push(job_type);
        }
        self
    }
}

/// Acknowledgement of an admitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enqueued {
    pub identifier: JobId,
    /// False when the store write failed; the job is still queued in memory.
    pub persisted: bool,
}

/// Insertion-level failure of `JobRunner::add_job`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddJobError {
    #[error("runner {runner} does not own job type {job_type}")]
    UnknownJobType { runner: String, job_type: String },

    #[error("an equivalent {job_type} job is already queued")]
    Rejected { job_type: String },

    #[error("job could not be serialized: {0}")]
    Serialization(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunnerError {
    #[error("runner {0} is already started")]
    AlreadyStarted(String),
}

/// Runner statistics since construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct RunnerStats {
    pub runs: u64,
    pub succeeded: u64,
    pub retried: u64,
    pub abandoned: u64,
    pub permanent_failures: u64,
    pub timed_out: u64,
    pub panicked: u64,
}

#[derive(Debug)]
struct QueueEntry {
    seq: u64,
    job: ScheduledJob,
}

#[derive(Debug, Default)]
struct RunnerState {
    queue: Vec<QueueEntry>,
    next_seq: u64,
    executing: Option<JobId>,
    // Running jobs replaced by a newer admission; dropped when they settle.
    superseded: HashSet<JobId>,
    // Runs abandoned on timeout that have not wound down yet.
    lingering: HashMap<JobId, JoinHandle<RunOutcome>>,
    last_success: Option<DateTime<Utc>>,
    stopping: bool,
    stats: RunnerStats,
}

impl RunnerState {
    fn push(&mut self, job: ScheduledJob) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(QueueEntry { seq, job });
    }

    fn contains(&self, identifier: JobId) -> bool {
        self.queue.iter().any(|e| e.job.identifier() == identifier)
    }

    fn entry_mut(&mut self, identifier: JobId) -> Option<&mut QueueEntry> {
        self.queue
            .iter_mut()
            .find(|e| e.job.identifier() == identifier)
    }

    fn next_due(&self) -> Option<&QueueEntry> {
        self.queue
            .iter()
            .filter(|e| Some(e.job.identifier()) != self.executing)
            .min_by_key(|e| (e.job.meta().next_attempt_at(), e.seq))
    }

    fn records_of_type(&self, job_type: &str, include_executing: bool) -> Vec<PersistedJobRecord> {
        self.ordered()
            .into_iter()
            .filter(|e| e.job.meta().job_type() == job_type)
            .filter(|e| include_executing || Some(e.job.identifier()) != self.executing)
            .filter(|e| !self.superseded.contains(&e.job.identifier()))
            .filter_map(|e| e.job.to_record().ok())
            .collect()
    }

    fn ordered(&self) -> Vec<&QueueEntry> {
        let mut entries: Vec<_> = self.queue.iter().collect();
        entries.sort_by_key(|e| (e.job.meta().next_attempt_at(), e.seq));
        entries
    }
}

struct RunnerInner {
    name: String,
    job_types: Vec<&'static str>,
    store: Arc<dyn JobStore>,
    registry: Arc<JobTypeRegistry>,
    clock: Arc<dyn Clock>,
    state: Mutex<RunnerState>,
    wake: Notify,
}

/// Sequential executor for one named queue.
pub struct JobRunner {
    inner: Arc<RunnerInner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl core::fmt::Debug for JobRunner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("JobRunner")
            .field("name", &self.inner.name)
            .field("job_types", &self.inner.job_types)
            .finish_non_exhaustive()
    }
}

impl JobRunner {
    pub fn new(
        config: RunnerConfig,
        store: Arc<dyn JobStore>,
        registry: Arc<JobTypeRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        for job_type in &config.job_types {
            if !registry.contains(job_type) {
                warn!(
                    runner = %config.name,
                    job_type = %job_type,
                    "no decoder registered; persisted jobs of this type will be skipped"
                );
            }
        }

        Self {
            inner: Arc::new(RunnerInner {
                name: config.name,
                job_types: config.job_types,
                store,
                registry,
                clock,
                state: Mutex::new(RunnerState::default()),
                wake: Notify::new(),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    /// Admit, persist and queue a job.
    ///
    /// Returns immediately after insertion; the run outcome is never reported
    /// back to the caller. A failed store write is logged and reflected in
    /// `Enqueued::persisted`, the job still runs in this process.
    pub async fn add_job(&self, job: ScheduledJob) -> Result<Enqueued, AddJobError> {
        let inner = &self.inner;
        let job_type = job.meta().job_type().to_string();

        if !inner.owns(&job_type) {
            return Err(AddJobError::UnknownJobType {
                runner: inner.name.clone(),
                job_type,
            });
        }

        let record = job
            .to_record()
            .map_err(|e| AddJobError::Serialization(e.to_string()))?;

        let mut state = inner.state.lock().await;

        let idle = state.records_of_type(&job_type, false);
        for stale in job.job().stale_records_to_purge(&idle) {
            inner.forget(&mut state, stale, "superseded stale record").await;
        }

        let existing = state.records_of_type(&job_type, true);
        match job.job().admission_check(&existing) {
            AdmissionDecision::Admit => {}
            AdmissionDecision::Reject => {
                debug!(runner = %inner.name, job_type = %job_type, "equivalent job already queued; not adding");
                return Err(AddJobError::Rejected { job_type });
            }
            AdmissionDecision::ReplaceExisting(ids) => {
                for id in ids {
                    if state.executing == Some(id) {
                        debug!(runner = %inner.name, job_id = %id, "replaced job is running; dropping it once it settles");
                        state.superseded.insert(id);
                        continue;
                    }
                    inner.forget(&mut state, id, "replaced by newer job").await;
                }
            }
        }

        let identifier = job.identifier();
        let persisted = match inner.store.put(&record).await {
            Ok(()) => true,
            Err(e) => {
                error!(runner = %inner.name, job_id = %identifier, error = %e, "failed to persist job; keeping it in memory");
                false
            }
        };

        state.push(job);
        drop(state);
        inner.wake.notify_one();

        debug!(runner = %inner.name, job_id = %identifier, job_type = %job_type, "job added");
        Ok(Enqueued {
            identifier,
            persisted,
        })
    }

    /// Load persisted jobs and spawn the drain loop.
    ///
    /// Returns the number of jobs loaded from the store. Malformed records
    /// are skipped, never fatal.
    pub async fn start(&self) -> Result<usize, RunnerError> {
        let mut worker = self.worker.lock().await;
        if worker.is_some() {
            return Err(RunnerError::AlreadyStarted(self.inner.name.clone()));
        }

        let loaded = self.inner.load_persisted().await;
        self.inner.state.lock().await.stopping = false;
        *worker = Some(tokio::spawn(drain_loop(Arc::clone(&self.inner))));

        info!(runner = %self.inner.name, loaded, "job runner started");
        Ok(loaded)
    }

    /// Finish the in-flight run (bounded by its timeout) and stop dequeuing.
    ///
    /// Queued jobs stay in memory and in the store; `start` resumes them.
    pub async fn stop(&self) {
        let Some(handle) = self.worker.lock().await.take() else {
            return;
        };

        self.inner.state.lock().await.stopping = true;
        self.inner.wake.notify_one();

        if let Err(e) = handle.await {
            warn!(runner = %self.inner.name, error = %e, "drain loop ended abnormally");
        }
        let stats = {
            let mut state = self.inner.state.lock().await;
            state.stopping = false;
            state.stats.clone()
        };
        info!(
            runner = %self.inner.name,
            runs = stats.runs,
            succeeded = stats.succeeded,
            abandoned = stats.abandoned,
            "job runner stopped"
        );
    }

    pub async fn is_running(&self) -> bool {
        self.worker.lock().await.is_some()
    }

    /// Time of the most recent successful run in this process.
    pub async fn last_success(&self) -> Option<DateTime<Utc>> {
        self.inner.state.lock().await.last_success
    }

    pub async fn reset_last_success(&self) {
        self.inner.state.lock().await.last_success = None;
    }

    /// Snapshot of the queue, earliest due first.
    pub async fn queued(&self) -> Vec<PersistedJobRecord> {
        let state = self.inner.state.lock().await;
        state
            .ordered()
            .into_iter()
            .filter_map(|e| e.job.to_record().ok())
            .collect()
    }

    pub async fn is_executing(&self) -> bool {
        self.inner.state.lock().await.executing.is_some()
    }

    pub async fn stats(&self) -> RunnerStats {
        self.inner.state.lock().await.stats.clone()
    }
}

impl RunnerInner {
    fn owns(&self, job_type: &str) -> bool {
        self.job_types.iter().any(|t| *t == job_type)
    }

    /// Drop a job from the queue and the store.
    async fn forget(&self, state: &mut RunnerState, identifier: JobId, reason: &'static str) {
        state.queue.retain(|e| e.job.identifier() != identifier);
        state.superseded.remove(&identifier);
        if let Err(e) = self.store.remove(identifier).await {
            error!(runner = %self.name, job_id = %identifier, error = %e, "failed to remove job record");
        }
        debug!(runner = %self.name, job_id = %identifier, reason, "job removed");
    }

    async fn persist(&self, job: &ScheduledJob) {
        let record = match job.to_record() {
            Ok(r) => r,
            Err(e) => {
                error!(runner = %self.name, job_id = %job.identifier(), error = %e, "failed to serialize job");
                return;
            }
        };
        if let Err(e) = self.store.put(&record).await {
            error!(runner = %self.name, job_id = %job.identifier(), error = %e, "failed to persist job update");
        }
    }

    async fn load_persisted(&self) -> usize {
        let mut state = self.state.lock().await;
        let mut loaded = 0;

        for job_type in &self.job_types {
            let records = match self.store.list_by_type(job_type).await {
                Ok(records) => records,
                Err(e) => {
                    error!(runner = %self.name, job_type = %job_type, error = %e, "failed to list persisted jobs");
                    continue;
                }
            };

            let mut jobs = Vec::with_capacity(records.len());
            for record in records {
                if state.contains(record.identifier()) {
                    continue;
                }
                match self.registry.decode(&record) {
                    Ok(job) => jobs.push(job),
                    Err(e) => warn!(
                        runner = %self.name,
                        job_id = %record.identifier(),
                        error = %e,
                        "skipping malformed persisted job"
                    ),
                }
            }

            let mut doomed = Vec::new();
            jobs.retain(|job| {
                if job.meta().is_exhausted() {
                    doomed.push(job.identifier());
                    false
                } else {
                    true
                }
            });

            if let Some(first) = jobs.first() {
                let records: Vec<_> = jobs.iter().filter_map(|j| j.to_record().ok()).collect();
                let stale = first.job().stale_records_to_purge(&records);
                jobs.retain(|j| !stale.contains(&j.identifier()));
                doomed.extend(stale);
            }

            for identifier in doomed {
                self.forget(&mut state, identifier, "obsolete at startup").await;
            }
            for job in jobs {
                state.push(job);
                loaded += 1;
            }
        }

        drop(state);
        if loaded > 0 {
            self.wake.notify_one();
        }
        loaded
    }

    async fn execute(&self, identifier: JobId) {
        let (job, ctx, timeout) = {
            let mut state = self.state.lock().await;
            let now = self.clock.now();

            if let Some(previous) = state.lingering.get(&identifier) {
                if !previous.is_finished() {
                    if let Some(entry) = state.entry_mut(identifier) {
                        let at = entry.job.meta_mut().defer(now);
                        warn!(runner = %self.name, job_id = %identifier, next_attempt = %at, "previous run still in flight; deferring");
                        let job = entry.job.clone();
                        self.persist(&job).await;
                    }
                    return;
                }
                state.lingering.remove(&identifier);
            }

            let Some(entry) = state.entry_mut(identifier) else {
                return;
            };
            let job = Arc::clone(entry.job.job());
            let timeout = job.timeout();
            let ctx = JobContext {
                identifier,
                job_type: entry.job.meta().job_type().to_string(),
                attempt: entry.job.meta().current_retry() + 1,
                deadline: now + chrono::Duration::from_std(timeout).unwrap_or_default(),
            };
            state.executing = Some(identifier);
            state.stats.runs += 1;
            (job, ctx, timeout)
        };

        debug!(
            runner = %self.name,
            job_id = %identifier,
            job_type = %ctx.job_type,
            attempt = ctx.attempt,
            "running job"
        );

        let mut handle = tokio::spawn(async move { job.run(&ctx).await });
        let mut lingering = None;
        let outcome = match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                if e.is_panic() {
                    self.state.lock().await.stats.panicked += 1;
                    warn!(runner = %self.name, job_id = %identifier, "job panicked");
                } else {
                    warn!(runner = %self.name, job_id = %identifier, error = %e, "job task cancelled");
                }
                RunOutcome::RetryIfPossible
            }
            Err(_) => {
                handle.abort();
                lingering = Some(handle);
                self.state.lock().await.stats.timed_out += 1;
                warn!(runner = %self.name, job_id = %identifier, timeout_ms = timeout.as_millis() as u64, "job timed out");
                RunOutcome::RetryIfPossible
            }
        };

        self.settle(identifier, outcome, lingering).await;
    }

    async fn settle(
        &self,
        identifier: JobId,
        outcome: RunOutcome,
        lingering: Option<JoinHandle<RunOutcome>>,
    ) {
        let mut state = self.state.lock().await;
        state.executing = None;
        state.lingering.retain(|_, h| !h.is_finished());
        if let Some(handle) = lingering {
            state.lingering.insert(identifier, handle);
        }

        let now = self.clock.now();
        let superseded = state.superseded.remove(&identifier);
        match outcome {
            RunOutcome::Success => {
                state.stats.succeeded += 1;
                state.last_success = Some(state.last_success.map_or(now, |prev| prev.max(now)));
                self.forget(&mut state, identifier, "succeeded").await;
                debug!(runner = %self.name, job_id = %identifier, "job succeeded");
            }
            RunOutcome::PermanentFailure => {
                state.stats.permanent_failures += 1;
                warn!(runner = %self.name, job_id = %identifier, "job failed permanently");
                self.forget(&mut state, identifier, "permanent failure").await;
            }
            RunOutcome::RetryIfPossible if superseded => {
                self.forget(&mut state, identifier, "superseded while running").await;
            }
            RunOutcome::RetryIfPossible => {
                let Some(entry) = state.entry_mut(identifier) else {
                    return;
                };
                match entry.job.meta_mut().register_retry(now) {
                    RetryDecision::Exhausted => {
                        let attempts = entry.job.meta().current_retry();
                        state.stats.abandoned += 1;
                        warn!(runner = %self.name, job_id = %identifier, attempts, "job abandoned after exhausting its attempts");
                        self.forget(&mut state, identifier, "attempts exhausted").await;
                    }
                    RetryDecision::Rescheduled(at) => {
                        let job = entry.job.clone();
                        state.stats.retried += 1;
                        debug!(
                            runner = %self.name,
                            job_id = %identifier,
                            retry = job.meta().current_retry(),
                            next_attempt = %at,
                            "job will be retried"
                        );
                        self.persist(&job).await;
                    }
                }
            }
        }
    }
}

async fn drain_loop(inner: Arc<RunnerInner>) {
    loop {
        let next = {
            let state = inner.state.lock().await;
            if state.stopping {
                break;
            }
            state.next_due().map(|e| e.job.meta().clone())
        };

        let Some(meta) = next else {
            inner.wake.notified().await;
            continue;
        };

        let now = inner.clock.now();
        if !meta.is_due(now) {
            let wait = (meta.next_attempt_at() - now).to_std().unwrap_or_default();
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = inner.wake.notified() => {}
            }
            continue;
        }

        inner.execute(meta.identifier()).await;
    }

    debug!(runner = %inner.name, "drain loop exited");
}
