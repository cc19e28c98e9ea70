//! Result of a trigger function asking a runner for more work.

use taskmill_core::JobId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// A new job was admitted.
    Queued(JobId),
    /// The trigger decided no job was needed (rate limit, nothing to do).
    Skipped,
    /// The runner already holds an equivalent job.
    Rejected,
}

impl TriggerOutcome {
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued(_))
    }
}
