//! Core job types: the `Job` contract, retry bookkeeping and the persisted record.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use taskmill_core::JobId;

/// Result of a single `Job::run` invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Work is done; the job is removed.
    Success,
    /// Transient failure; retried while the attempt budget allows.
    RetryIfPossible,
    /// Retrying cannot help; the job is removed immediately.
    PermanentFailure,
}

/// Verdict of a job's admission hook, evaluated before insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionDecision {
    /// Insert the candidate.
    Admit,
    /// An equivalent job is already queued; drop the candidate.
    Reject,
    /// Remove the listed queued jobs, then insert the candidate.
    ReplaceExisting(Vec<JobId>),
}

impl AdmissionDecision {
    /// At most one outstanding job of a type: reject when any record is present.
    pub fn reject_if_any(existing: &[PersistedJobRecord]) -> Self {
        if existing.is_empty() {
            Self::Admit
        } else {
            Self::Reject
        }
    }
}

/// Per-invocation information handed to `Job::run`.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub identifier: JobId,
    pub job_type: String,
    /// 1-based attempt number of this invocation.
    pub attempt: u32,
    /// Instant after which the runner stops waiting for this invocation.
    pub deadline: DateTime<Utc>,
}

/// A unit of deferred, retryable background work.
///
/// Implementations hold the job-kind-specific payload plus whatever
/// collaborators they need; retry bookkeeping lives in `JobMeta` and is owned
/// by the runner.
///
/// `run` may be invoked more than once over a job's lifetime and must only
/// commit side effects on paths that return `RunOutcome::Success`.
#[async_trait]
pub trait Job: Send + Sync + core::fmt::Debug + 'static {
    /// Stable type tag used for routing, dedup and deserialization.
    fn job_type(&self) -> &'static str;

    /// Job-specific part of the persisted record.
    fn payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        Ok(serde_json::Value::Object(serde_json::Map::new()))
    }

    async fn run(&self, ctx: &JobContext) -> RunOutcome;

    /// Decide whether this candidate may join a queue already holding
    /// `existing` (records of the same job type, executing job included).
    fn admission_check(&self, existing: &[PersistedJobRecord]) -> AdmissionDecision;

    /// Identifiers among `existing` (non-running records of the same type)
    /// that are obsolete and should be dropped.
    fn stale_records_to_purge(&self, _existing: &[PersistedJobRecord]) -> Vec<JobId> {
        Vec::new()
    }

    /// Wall-clock budget for a single `run`.
    fn timeout(&self) -> Duration;

    fn default_max_attempts(&self) -> u32;

    fn delay_between_retries(&self) -> Duration;
}

/// Retry bookkeeping shared by every job kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMeta {
    job_type: String,
    identifier: JobId,
    current_retry: u32,
    max_attempts: u32,
    delay_between_retries_ms: u64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    next_attempt_timestamp: DateTime<Utc>,
}

/// Outcome of recording a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Rescheduled(DateTime<Utc>),
    Exhausted,
}

impl JobMeta {
    pub fn new(
        job_type: impl Into<String>,
        identifier: JobId,
        max_attempts: u32,
        delay_between_retries: Duration,
        next_attempt_at: DateTime<Utc>,
    ) -> Self {
        Self {
            job_type: job_type.into(),
            identifier,
            current_retry: 0,
            max_attempts: max_attempts.max(1),
            delay_between_retries_ms: delay_between_retries.as_millis() as u64,
            next_attempt_timestamp: next_attempt_at,
        }
    }

    pub fn job_type(&self) -> &str {
        &self.job_type
    }

    pub fn identifier(&self) -> JobId {
        self.identifier
    }

    pub fn current_retry(&self) -> u32 {
        self.current_retry
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay_between_retries(&self) -> Duration {
        Duration::from_millis(self.delay_between_retries_ms)
    }

    pub fn next_attempt_at(&self) -> DateTime<Utc> {
        self.next_attempt_timestamp
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.next_attempt_timestamp
    }

    /// The attempt budget is spent; the job must not run again.
    pub fn is_exhausted(&self) -> bool {
        self.current_retry >= self.max_attempts
    }

    /// Count a failed attempt and push the next attempt out by the retry delay.
    pub(crate) fn register_retry(&mut self, now: DateTime<Utc>) -> RetryDecision {
        self.current_retry = self.current_retry.saturating_add(1).min(self.max_attempts);
        if self.is_exhausted() {
            return RetryDecision::Exhausted;
        }
        RetryDecision::Rescheduled(self.push_back(now))
    }

    /// Push the next attempt out without counting an attempt.
    pub(crate) fn defer(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.push_back(now)
    }

    // Never moves the due time earlier.
    fn push_back(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        let base = self.next_attempt_timestamp.max(now);
        let delay = chrono::Duration::milliseconds(self.delay_between_retries_ms as i64);
        self.next_attempt_timestamp = base + delay;
        self.next_attempt_timestamp
    }
}

/// Durable snapshot of a scheduled job: bookkeeping fields plus payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedJobRecord {
    #[serde(flatten)]
    pub meta: JobMeta,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl PersistedJobRecord {
    pub fn identifier(&self) -> JobId {
        self.meta.identifier()
    }

    pub fn job_type(&self) -> &str {
        self.meta.job_type()
    }
}

/// A job paired with its retry bookkeeping, as held in a runner queue.
#[derive(Debug, Clone)]
pub struct ScheduledJob {
    meta: JobMeta,
    job: Arc<dyn Job>,
}

impl ScheduledJob {
    /// Schedule a fresh job, due no earlier than `not_before`.
    pub fn new<J: Job>(job: J, not_before: DateTime<Utc>) -> Self {
        Self::from_arc(Arc::new(job), not_before)
    }

    pub fn from_arc(job: Arc<dyn Job>, not_before: DateTime<Utc>) -> Self {
        let meta = JobMeta::new(
            job.job_type(),
            JobId::new(),
            job.default_max_attempts(),
            job.delay_between_retries(),
            not_before,
        );
        Self { meta, job }
    }

    /// Rebuild from persisted bookkeeping (used when loading from storage).
    pub(crate) fn from_parts(meta: JobMeta, job: Arc<dyn Job>) -> Self {
        Self { meta, job }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.meta.max_attempts = max_attempts.max(1);
        self
    }

    pub fn meta(&self) -> &JobMeta {
        &self.meta
    }

    pub(crate) fn meta_mut(&mut self) -> &mut JobMeta {
        &mut self.meta
    }

    pub fn job(&self) -> &Arc<dyn Job> {
        &self.job
    }

    pub fn identifier(&self) -> JobId {
        self.meta.identifier
    }

    pub fn to_record(&self) -> Result<PersistedJobRecord, serde_json::Error> {
        Ok(PersistedJobRecord {
            meta: self.meta.clone(),
            payload: self.job.payload()?,
        })
    }
}
