use std::sync::Arc;

use tracing::debug;

use taskmill_core::Clock;
use taskmill_infra::jobs::{AddJobError, JobRunner, ScheduledJob};

use super::job::{AvatarContext, AvatarDownload, AvatarDownloadJob};
use crate::trigger::TriggerOutcome;

/// Queues avatar downloads on the runner that owns them.
#[derive(Debug, Clone)]
pub struct AvatarTrigger {
    runner: Arc<JobRunner>,
    ctx: AvatarContext,
}

impl AvatarTrigger {
    pub fn new(runner: Arc<JobRunner>, ctx: AvatarContext) -> Self {
        Self { runner, ctx }
    }

    /// Queue an immediately due download of `avatar_url` for a conversation.
    ///
    /// A pending download of another URL for the same conversation is
    /// superseded; an identical one makes this a no-op.
    pub async fn queue_avatar_download(
        &self,
        conversation_id: &str,
        avatar_url: &str,
    ) -> Result<TriggerOutcome, AddJobError> {
        if conversation_id.is_empty() || avatar_url.is_empty() {
            debug!(conversation_id, "no avatar to download");
            return Ok(TriggerOutcome::Skipped);
        }

        let request = AvatarDownload {
            conversation_id: conversation_id.to_string(),
            avatar_url: avatar_url.to_string(),
        };
        let job = ScheduledJob::new(
            AvatarDownloadJob::new(request, self.ctx.clone()),
            self.runner.clock().now(),
        );

        match self.runner.add_job(job).await {
            Ok(enqueued) => {
                debug!(conversation_id, job_id = %enqueued.identifier, "avatar download queued");
                Ok(TriggerOutcome::Queued(enqueued.identifier))
            }
            Err(AddJobError::Rejected { .. }) => Ok(TriggerOutcome::Rejected),
            Err(e) => Err(e),
        }
    }
}
