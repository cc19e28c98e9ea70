use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use taskmill_core::JobId;
use taskmill_infra::jobs::{AdmissionDecision, Job, JobContext, PersistedJobRecord, RunOutcome};

use super::io::{AvatarCache, AvatarFetcher, FetchError};

pub const AVATAR_DOWNLOAD_JOB_TYPE: &str = "AvatarDownloadJobType";

/// What to download, and for whom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvatarDownload {
    pub conversation_id: String,
    pub avatar_url: String,
}

impl AvatarDownload {
    fn from_record(record: &PersistedJobRecord) -> Option<Self> {
        serde_json::from_value(record.payload.clone()).ok()
    }
}

/// Collaborators of the avatar job.
#[derive(Clone)]
pub struct AvatarContext {
    pub fetcher: Arc<dyn AvatarFetcher>,
    pub cache: Arc<dyn AvatarCache>,
}

impl core::fmt::Debug for AvatarContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AvatarContext").finish_non_exhaustive()
    }
}

/// Downloads a conversation's avatar into the local cache.
#[derive(Debug, Clone)]
pub struct AvatarDownloadJob {
    request: AvatarDownload,
    ctx: AvatarContext,
}

impl AvatarDownloadJob {
    pub fn new(request: AvatarDownload, ctx: AvatarContext) -> Self {
        Self { request, ctx }
    }

    pub fn request(&self) -> &AvatarDownload {
        &self.request
    }
}

#[async_trait]
impl Job for AvatarDownloadJob {
    fn job_type(&self) -> &'static str {
        AVATAR_DOWNLOAD_JOB_TYPE
    }

    fn payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(&self.request)
    }

    async fn run(&self, ctx: &JobContext) -> RunOutcome {
        let AvatarDownload {
            conversation_id,
            avatar_url,
        } = &self.request;

        if conversation_id.is_empty() || avatar_url.is_empty() {
            warn!(job_id = %ctx.identifier, "avatar download without conversation or url");
            return RunOutcome::PermanentFailure;
        }

        debug!(job_id = %ctx.identifier, conversation_id = %conversation_id, attempt = ctx.attempt, "downloading avatar");

        let bytes = match self.ctx.fetcher.fetch(avatar_url).await {
            Ok(bytes) => bytes,
            Err(FetchError::NotFound(e)) => {
                warn!(conversation_id = %conversation_id, error = %e, "avatar is gone; giving up");
                return RunOutcome::PermanentFailure;
            }
            Err(e) => {
                warn!(conversation_id = %conversation_id, error = %e, "avatar download failed; will retry if possible");
                return RunOutcome::RetryIfPossible;
            }
        };

        if bytes.is_empty() {
            debug!(conversation_id = %conversation_id, "downloaded avatar is empty");
            return RunOutcome::RetryIfPossible;
        }

        if let Err(e) = self.ctx.cache.save(conversation_id, avatar_url, &bytes).await {
            warn!(conversation_id = %conversation_id, error = %e, "failed to store avatar; will retry if possible");
            return RunOutcome::RetryIfPossible;
        }

        debug!(conversation_id = %conversation_id, size = bytes.len(), "avatar stored");
        RunOutcome::Success
    }

    fn admission_check(&self, existing: &[PersistedJobRecord]) -> AdmissionDecision {
        let mut superseded = Vec::new();
        for record in existing {
            let Some(queued) = AvatarDownload::from_record(record) else {
                continue;
            };
            if queued.conversation_id != self.request.conversation_id {
                continue;
            }
            if queued.avatar_url == self.request.avatar_url {
                return AdmissionDecision::Reject;
            }
            superseded.push(record.identifier());
        }

        if superseded.is_empty() {
            AdmissionDecision::Admit
        } else {
            AdmissionDecision::ReplaceExisting(superseded)
        }
    }

    /// Keep only the most recently requested download per conversation.
    ///
    /// Job identifiers are time-ordered, so the greatest one is the newest
    /// request. Due times say nothing here: a retried old request is due
    /// later than a fresh one.
    fn stale_records_to_purge(&self, existing: &[PersistedJobRecord]) -> Vec<JobId> {
        let mut latest: HashMap<String, JobId> = HashMap::new();
        let mut stale = Vec::new();

        for record in existing {
            let Some(request) = AvatarDownload::from_record(record) else {
                continue;
            };
            let identifier = record.identifier();
            match latest.entry(request.conversation_id) {
                Entry::Vacant(slot) => {
                    slot.insert(identifier);
                }
                Entry::Occupied(mut slot) => {
                    let kept = slot.get_mut();
                    stale.push((*kept).min(identifier));
                    *kept = (*kept).max(identifier);
                }
            }
        }

        stale
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(10)
    }

    fn default_max_attempts(&self) -> u32 {
        3
    }

    fn delay_between_retries(&self) -> Duration {
        Duration::from_secs(10)
    }
}
