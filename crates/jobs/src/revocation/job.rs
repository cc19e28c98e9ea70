use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use taskmill_infra::jobs::{AdmissionDecision, Job, JobContext, PersistedJobRecord, RunOutcome};
use taskmill_infra::settings::SettingsStore;

use super::api::{RevocationApi, RevocationResult};
use super::list::{ITEMS_KEY, TICKET_KEY, stored_ticket};
use crate::flags::{FeatureFlags, PRO_AVAILABLE};

pub const UPDATE_REVOCATION_LIST_JOB_TYPE: &str = "UpdateProRevocationListJobType";

/// Collaborators of the revocation job.
#[derive(Clone)]
pub struct RevocationContext {
    pub api: Arc<dyn RevocationApi>,
    pub settings: Arc<dyn SettingsStore>,
    pub flags: Arc<dyn FeatureFlags>,
}

impl core::fmt::Debug for RevocationContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RevocationContext").finish_non_exhaustive()
    }
}

/// The revocation job carries no payload; anything but an object is corrupt.
#[derive(Debug, Deserialize)]
pub(crate) struct NoPayload {}

/// Pulls revocations newer than the stored ticket and caches them locally.
#[derive(Debug, Clone)]
pub struct UpdateRevocationListJob {
    ctx: RevocationContext,
}

impl UpdateRevocationListJob {
    pub fn new(ctx: RevocationContext) -> Self {
        Self { ctx }
    }

    async fn refresh(&self) -> RunOutcome {
        let settings = self.ctx.settings.as_ref();

        let stored = match stored_ticket(settings).await {
            Ok(ticket) => ticket,
            Err(e) => {
                warn!(error = %e, "failed to read revocation ticket; will retry if possible");
                return RunOutcome::RetryIfPossible;
            }
        };

        let response = match self.ctx.api.get_revocations(stored).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "revocation request failed; will retry if possible");
                return RunOutcome::RetryIfPossible;
            }
        };

        let RevocationResult { ticket, items } = match response.result {
            Some(result) if response.status_code == 200 => result,
            _ => {
                warn!(status_code = response.status_code, "revocation request rejected; will retry if possible");
                return RunOutcome::RetryIfPossible;
            }
        };

        if ticket <= stored {
            debug!(ticket = stored, "no new revocations");
            return RunOutcome::Success;
        }

        let count = items.len();
        let items = match serde_json::to_value(&items) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "failed to encode revocation items");
                return RunOutcome::RetryIfPossible;
            }
        };
        // Items before ticket: a crash in between only causes a refetch.
        if let Err(e) = settings.put(ITEMS_KEY, items).await {
            warn!(error = %e, "failed to store revocation items; will retry if possible");
            return RunOutcome::RetryIfPossible;
        }
        if let Err(e) = settings.put(TICKET_KEY, ticket.into()).await {
            warn!(error = %e, "failed to store revocation ticket; will retry if possible");
            return RunOutcome::RetryIfPossible;
        }

        info!(from_ticket = stored, to_ticket = ticket, items = count, "revocation list updated");
        RunOutcome::Success
    }
}

#[async_trait]
impl Job for UpdateRevocationListJob {
    fn job_type(&self) -> &'static str {
        UPDATE_REVOCATION_LIST_JOB_TYPE
    }

    async fn run(&self, ctx: &JobContext) -> RunOutcome {
        if !self.ctx.flags.is_enabled(PRO_AVAILABLE) {
            debug!(job_id = %ctx.identifier, "pro features unavailable; nothing to refresh");
            return RunOutcome::Success;
        }

        let started = tokio::time::Instant::now();
        let outcome = self.refresh().await;
        debug!(
            job_id = %ctx.identifier,
            attempt = ctx.attempt,
            elapsed_ms = started.elapsed().as_millis() as u64,
            ?outcome,
            "revocation refresh finished"
        );
        outcome
    }

    fn admission_check(&self, existing: &[PersistedJobRecord]) -> AdmissionDecision {
        AdmissionDecision::reject_if_any(existing)
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(20)
    }

    fn default_max_attempts(&self) -> u32 {
        2
    }

    fn delay_between_retries(&self) -> Duration {
        Duration::from_secs(15)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::flags::StaticFeatureFlags;
    use crate::revocation::api::{RevocationApiError, RevocationItem, RevocationResponse};
    use crate::testing::ScriptedRevocationApi;
    use taskmill_core::JobId;
    use taskmill_infra::settings::InMemorySettingsStore;

    struct Setup {
        api: Arc<ScriptedRevocationApi>,
        settings: Arc<InMemorySettingsStore>,
        flags: Arc<StaticFeatureFlags>,
        job: UpdateRevocationListJob,
    }

    fn setup(settings: InMemorySettingsStore) -> Setup {
        let api = Arc::new(ScriptedRevocationApi::new());
        let settings = Arc::new(settings);
        let flags = Arc::new(StaticFeatureFlags::new().with(PRO_AVAILABLE));
        let job = UpdateRevocationListJob::new(RevocationContext {
            api: api.clone(),
            settings: settings.clone(),
            flags: flags.clone(),
        });
        Setup {
            api,
            settings,
            flags,
            job,
        }
    }

    fn ctx() -> JobContext {
        JobContext {
            identifier: JobId::new(),
            job_type: UPDATE_REVOCATION_LIST_JOB_TYPE.to_string(),
            attempt: 1,
            deadline: Utc::now(),
        }
    }

    #[tokio::test]
    async fn newer_ticket_is_stored_with_items() {
        let s = setup(InMemorySettingsStore::new());
        let items = vec![RevocationItem {
            expiry_unix_ts_ms: 1_700_000_000_000,
            gen_index_hash: "beef".into(),
        }];
        s.api.push(Ok(RevocationResponse::ok(5, items)));

        assert_eq!(s.job.run(&ctx()).await, RunOutcome::Success);

        let saved = s.settings.snapshot();
        assert_eq!(saved[TICKET_KEY], json!(5));
        assert_eq!(saved[ITEMS_KEY][0]["gen_index_hash"], "beef");
        assert_eq!(s.api.calls(), vec![0]);
    }

    #[tokio::test]
    async fn stale_ticket_writes_nothing() {
        let s = setup(InMemorySettingsStore::new().with_value(TICKET_KEY, json!(7)));
        s.api.push(Ok(RevocationResponse::ok(7, Vec::new())));

        assert_eq!(s.job.run(&ctx()).await, RunOutcome::Success);

        let saved = s.settings.snapshot();
        assert_eq!(saved[TICKET_KEY], json!(7));
        assert!(!saved.contains_key(ITEMS_KEY));
        assert_eq!(s.api.calls(), vec![7]);
    }

    #[tokio::test]
    async fn non_200_and_transport_errors_are_retryable() {
        let s = setup(InMemorySettingsStore::new());
        s.api.push(Ok(RevocationResponse::status(503)));
        s.api.push(Err(RevocationApiError::Transport("connection reset".into())));

        assert_eq!(s.job.run(&ctx()).await, RunOutcome::RetryIfPossible);
        assert_eq!(s.job.run(&ctx()).await, RunOutcome::RetryIfPossible);
        assert!(s.settings.snapshot().is_empty());
    }

    #[tokio::test]
    async fn disabled_feature_skips_the_request() {
        let s = setup(InMemorySettingsStore::new());
        s.flags.set(PRO_AVAILABLE, false);

        assert_eq!(s.job.run(&ctx()).await, RunOutcome::Success);
        assert!(s.api.calls().is_empty());
    }

    #[test]
    fn only_one_outstanding_job() {
        let s = setup(InMemorySettingsStore::new());
        let record = taskmill_infra::jobs::ScheduledJob::new(s.job.clone(), Utc::now())
            .to_record()
            .unwrap();

        assert_eq!(s.job.admission_check(&[]), AdmissionDecision::Admit);
        assert_eq!(s.job.admission_check(&[record]), AdmissionDecision::Reject);
    }
}
