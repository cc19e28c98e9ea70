use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use taskmill_core::Clock;
use taskmill_infra::jobs::{AddJobError, JobRunner, ScheduledJob};

use super::job::{RevocationContext, UpdateRevocationListJob};
use crate::trigger::TriggerOutcome;

/// Minimum gap between successful refreshes in dev-like environments.
pub const DEV_REFRESH_INTERVAL: Duration = Duration::from_secs(15);

/// Minimum gap between successful refreshes otherwise.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Lead time of a periodically queued job.
pub const QUEUE_DELAY: Duration = Duration::from_secs(20);

/// Queues revocation refreshes on the runner that owns them.
///
/// Meant to be called from a periodic timer; the runner's last-success
/// watermark and the job's admission check make redundant calls harmless.
#[derive(Debug, Clone)]
pub struct RevocationTrigger {
    runner: Arc<JobRunner>,
    ctx: RevocationContext,
    interval: Duration,
}

impl RevocationTrigger {
    pub fn new(runner: Arc<JobRunner>, ctx: RevocationContext, interval: Duration) -> Self {
        Self {
            runner,
            ctx,
            interval,
        }
    }

    pub fn interval_for(dev_mode: bool) -> Duration {
        if dev_mode {
            DEV_REFRESH_INTERVAL
        } else {
            REFRESH_INTERVAL
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Queue a refresh unless one succeeded within the interval.
    pub async fn queue_new_job_if_needed(&self) -> Result<TriggerOutcome, AddJobError> {
        let now = self.runner.clock().now();

        if let Some(last) = self.runner.last_success().await {
            let since = (now - last).to_std().unwrap_or_default();
            if since <= self.interval {
                debug!(
                    since_last_success_ms = since.as_millis() as u64,
                    "revocation list refreshed recently; not scheduling"
                );
                return Ok(TriggerOutcome::Skipped);
            }
            debug!(
                since_last_success_ms = since.as_millis() as u64,
                "last revocation refresh is stale; scheduling"
            );
        }

        let not_before = now + chrono::Duration::from_std(QUEUE_DELAY).unwrap_or_default();
        self.add(not_before).await
    }

    /// Queue an immediately due refresh, ignoring the watermark.
    pub async fn run_on_startup(&self) -> Result<TriggerOutcome, AddJobError> {
        let now = self.runner.clock().now();
        self.add(now).await
    }

    async fn add(&self, not_before: chrono::DateTime<chrono::Utc>) -> Result<TriggerOutcome, AddJobError> {
        let job = ScheduledJob::new(UpdateRevocationListJob::new(self.ctx.clone()), not_before);
        match self.runner.add_job(job).await {
            Ok(enqueued) => Ok(TriggerOutcome::Queued(enqueued.identifier)),
            Err(AddJobError::Rejected { .. }) => Ok(TriggerOutcome::Rejected),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::flags::{PRO_AVAILABLE, StaticFeatureFlags};
    use crate::revocation::api::{RevocationItem, RevocationResponse};
    use crate::revocation::list::{ITEMS_KEY, TICKET_KEY};
    use crate::revocation::job::UPDATE_REVOCATION_LIST_JOB_TYPE;
    use crate::testing::ScriptedRevocationApi;
    use taskmill_core::TimeAnchorClock;
    use taskmill_infra::jobs::{InMemoryJobStore, JobTypeRegistry, RunnerConfig};
    use taskmill_infra::settings::InMemorySettingsStore;

    struct Harness {
        api: Arc<ScriptedRevocationApi>,
        settings: Arc<InMemorySettingsStore>,
        store: Arc<InMemoryJobStore>,
        runner: Arc<JobRunner>,
        trigger: RevocationTrigger,
    }

    fn harness() -> Harness {
        let api = Arc::new(ScriptedRevocationApi::new());
        let settings = Arc::new(InMemorySettingsStore::new());
        let store = InMemoryJobStore::arc();
        let ctx = RevocationContext {
            api: api.clone(),
            settings: settings.clone(),
            flags: Arc::new(StaticFeatureFlags::new().with(PRO_AVAILABLE)),
        };
        let mut registry = JobTypeRegistry::new();
        crate::revocation::register(&mut registry, ctx.clone());
        let clock: Arc<dyn Clock> = Arc::new(TimeAnchorClock::new());
        let runner = Arc::new(JobRunner::new(
            RunnerConfig::new("update_revocation_list").owning(UPDATE_REVOCATION_LIST_JOB_TYPE),
            store.clone(),
            Arc::new(registry),
            clock,
        ));
        let trigger = RevocationTrigger::new(runner.clone(), ctx, DEV_REFRESH_INTERVAL);
        Harness {
            api,
            settings,
            store,
            runner,
            trigger,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn success_path_updates_ticket_and_watermark() {
        let h = harness();
        h.api.push(Ok(RevocationResponse::ok(
            5,
            vec![RevocationItem {
                expiry_unix_ts_ms: 1,
                gen_index_hash: "00ff".into(),
            }],
        )));
        h.runner.start().await.unwrap();

        assert!(h.trigger.queue_new_job_if_needed().await.unwrap().is_queued());
        assert_eq!(h.store.len(), 1);

        tokio::time::sleep(Duration::from_secs(19)).await;
        assert!(h.api.calls().is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(h.api.calls(), vec![0]);
        assert_eq!(h.settings.snapshot()[TICKET_KEY], json!(5));
        assert!(h.settings.snapshot().contains_key(ITEMS_KEY));
        assert!(h.store.is_empty());
        assert!(h.runner.last_success().await.is_some());

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(h.api.calls().len(), 1);
        h.runner.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn retrigger_within_interval_is_skipped() {
        let h = harness();
        h.runner.start().await.unwrap();

        assert!(h.trigger.queue_new_job_if_needed().await.unwrap().is_queued());
        tokio::time::sleep(Duration::from_secs(21)).await;
        assert!(h.runner.last_success().await.is_some());

        assert_eq!(
            h.trigger.queue_new_job_if_needed().await.unwrap(),
            TriggerOutcome::Skipped
        );
        assert!(h.store.is_empty());
        assert_eq!(h.api.calls().len(), 1);

        tokio::time::sleep(DEV_REFRESH_INTERVAL).await;
        assert!(h.trigger.queue_new_job_if_needed().await.unwrap().is_queued());
        h.runner.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn second_trigger_before_run_is_rejected() {
        let h = harness();

        assert!(h.trigger.queue_new_job_if_needed().await.unwrap().is_queued());
        assert_eq!(
            h.trigger.queue_new_job_if_needed().await.unwrap(),
            TriggerOutcome::Rejected
        );
        assert_eq!(h.store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_backend_abandons_after_two_attempts() {
        let h = harness();
        h.api.set_fallback(Ok(RevocationResponse::status(500)));
        h.runner.start().await.unwrap();

        assert!(h.trigger.run_on_startup().await.unwrap().is_queued());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(h.api.calls().len(), 1);
        assert_eq!(h.store.len(), 1);

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(h.api.calls().len(), 2);
        assert!(h.store.is_empty());

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(h.api.calls().len(), 2);
        assert!(h.runner.last_success().await.is_none());
        assert!(!h.settings.snapshot().contains_key(TICKET_KEY));
        h.runner.stop().await;
    }

    #[test]
    fn interval_depends_on_environment() {
        assert_eq!(RevocationTrigger::interval_for(true), Duration::from_secs(15));
        assert_eq!(RevocationTrigger::interval_for(false), Duration::from_secs(900));
    }
}
