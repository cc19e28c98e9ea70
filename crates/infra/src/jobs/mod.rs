//! Durable background job scheduler.
//!
//! ## Design
//!
//! - Each runner owns a set of job types and executes at most one job at a time
//! - Jobs are persisted on admission and survive process restarts
//! - Failed attempts are retried after a fixed delay until the attempt budget is spent
//! - Runs are bounded by a per-job timeout; timeouts and panics count as retryable
//! - Admission hooks dedup or supersede queued jobs before insertion
//!
//! ## Components
//!
//! - `Job`: behaviour contract of a job kind
//! - `PersistedJobRecord`: durable snapshot (bookkeeping + payload)
//! - `JobStore`: record persistence (in-memory or Postgres)
//! - `JobTypeRegistry`: rebuilds jobs from stored records
//! - `JobRunner`: per-queue executor

pub mod codec;
pub mod postgres;
pub mod runner;
pub mod store;
pub mod types;

pub use codec::{JobCodecError, JobTypeRegistry};
pub use postgres::PostgresJobStore;
pub use runner::{AddJobError, Enqueued, JobRunner, RunnerConfig, RunnerError, RunnerStats};
pub use store::{InMemoryJobStore, JobStore, JobStoreError};
pub use types::{
    AdmissionDecision, Job, JobContext, JobMeta, PersistedJobRecord, RetryDecision, RunOutcome,
    ScheduledJob,
};
