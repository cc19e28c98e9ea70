//! The process's job runners, built once from injected dependencies.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use taskmill_core::Clock;
use taskmill_infra::jobs::{JobRunner, JobStore, JobTypeRegistry, RunnerConfig, RunnerError};
use taskmill_infra::settings::SettingsStore;

use crate::avatar::{self, AVATAR_DOWNLOAD_JOB_TYPE, AvatarCache, AvatarContext, AvatarFetcher, AvatarTrigger};
use crate::flags::FeatureFlags;
use crate::revocation::{
    self, RevocationApi, RevocationContext, RevocationTrigger, UPDATE_REVOCATION_LIST_JOB_TYPE,
};

/// Everything the runners and their jobs need from the host.
#[derive(Clone)]
pub struct JobDependencies {
    pub store: Arc<dyn JobStore>,
    pub settings: Arc<dyn SettingsStore>,
    pub flags: Arc<dyn FeatureFlags>,
    pub revocation_api: Arc<dyn RevocationApi>,
    pub avatar_fetcher: Arc<dyn AvatarFetcher>,
    pub avatar_cache: Arc<dyn AvatarCache>,
    pub clock: Arc<dyn Clock>,
    /// Minimum gap between successful revocation refreshes.
    pub revocation_interval: Duration,
}

impl core::fmt::Debug for JobDependencies {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("JobDependencies")
            .field("clock", &self.clock)
            .field("revocation_interval", &self.revocation_interval)
            .finish_non_exhaustive()
    }
}

/// Named runners plus the triggers that feed them.
#[derive(Debug)]
pub struct Runners {
    pub update_revocation_list: Arc<JobRunner>,
    pub avatar_download: Arc<JobRunner>,
    revocation: RevocationTrigger,
    avatars: AvatarTrigger,
}

impl Runners {
    pub fn new(deps: JobDependencies) -> Self {
        let revocation_ctx = RevocationContext {
            api: deps.revocation_api.clone(),
            settings: deps.settings.clone(),
            flags: deps.flags.clone(),
        };
        let avatar_ctx = AvatarContext {
            fetcher: deps.avatar_fetcher.clone(),
            cache: deps.avatar_cache.clone(),
        };

        let mut registry = JobTypeRegistry::new();
        revocation::register(&mut registry, revocation_ctx.clone());
        avatar::register(&mut registry, avatar_ctx.clone());
        let registry = Arc::new(registry);

        let runner = |config: RunnerConfig| {
            Arc::new(JobRunner::new(
                config,
                deps.store.clone(),
                registry.clone(),
                deps.clock.clone(),
            ))
        };
        let update_revocation_list = runner(
            RunnerConfig::new("update_revocation_list").owning(UPDATE_REVOCATION_LIST_JOB_TYPE),
        );
        let avatar_download =
            runner(RunnerConfig::new("avatar_download").owning(AVATAR_DOWNLOAD_JOB_TYPE));

        Self {
            revocation: RevocationTrigger::new(
                update_revocation_list.clone(),
                revocation_ctx,
                deps.revocation_interval,
            ),
            avatars: AvatarTrigger::new(avatar_download.clone(), avatar_ctx),
            update_revocation_list,
            avatar_download,
        }
    }

    pub fn all(&self) -> [&Arc<JobRunner>; 2] {
        [&self.update_revocation_list, &self.avatar_download]
    }

    pub fn revocation(&self) -> &RevocationTrigger {
        &self.revocation
    }

    pub fn avatars(&self) -> &AvatarTrigger {
        &self.avatars
    }

    /// Load persisted jobs and start every runner. Returns the number of jobs resumed.
    pub async fn start_all(&self) -> Result<usize, RunnerError> {
        let mut resumed = 0;
        for runner in self.all() {
            resumed += runner.start().await?;
        }
        info!(resumed, "job runners started");
        Ok(resumed)
    }

    /// Stop every runner, letting in-flight jobs finish.
    pub async fn stop_all(&self) {
        for runner in self.all() {
            runner.stop().await;
        }
        info!("job runners stopped");
    }
}
