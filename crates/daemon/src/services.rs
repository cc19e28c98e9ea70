//! Wiring of stores and collaborators from the daemon configuration.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sqlx::PgPool;
use tracing::{info, warn};

use taskmill_core::TimeAnchorClock;
use taskmill_infra::jobs::{InMemoryJobStore, JobStore, PostgresJobStore};
use taskmill_infra::settings::{InMemorySettingsStore, PostgresSettingsStore, SettingsStore};
use taskmill_jobs::{JobDependencies, PRO_AVAILABLE, StaticFeatureFlags};

use crate::avatar_fs::FsAvatarCache;
use crate::config::DaemonConfig;
use crate::http::{HttpAvatarFetcher, HttpRevocationApi};

/// Request budgets, below the timeouts of the jobs that use them.
const REVOCATION_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const AVATAR_REQUEST_TIMEOUT: Duration = Duration::from_secs(8);

pub async fn build_dependencies(config: &DaemonConfig) -> anyhow::Result<JobDependencies> {
    let (store, settings) = build_stores(config).await?;

    let flags = StaticFeatureFlags::new();
    flags.set(PRO_AVAILABLE, config.pro_available);

    let revocation_api = HttpRevocationApi::new(&config.pro_backend_url, REVOCATION_REQUEST_TIMEOUT)
        .context("failed to build pro backend client")?;
    let avatar_fetcher =
        HttpAvatarFetcher::new(AVATAR_REQUEST_TIMEOUT).context("failed to build avatar client")?;

    Ok(JobDependencies {
        store,
        settings,
        flags: Arc::new(flags),
        revocation_api: Arc::new(revocation_api),
        avatar_fetcher: Arc::new(avatar_fetcher),
        avatar_cache: Arc::new(FsAvatarCache::new(&config.avatar_dir)),
        clock: Arc::new(TimeAnchorClock::new()),
        revocation_interval: config.revocation_interval(),
    })
}

async fn build_stores(
    config: &DaemonConfig,
) -> anyhow::Result<(Arc<dyn JobStore>, Arc<dyn SettingsStore>)> {
    let Some(database_url) = &config.database_url else {
        warn!("DATABASE_URL not set; jobs and settings will not survive a restart");
        return Ok((InMemoryJobStore::arc(), Arc::new(InMemorySettingsStore::new())));
    };

    let pool = PgPool::connect(database_url)
        .await
        .context("failed to connect to Postgres")?;

    let jobs = PostgresJobStore::new(pool.clone());
    jobs.ensure_schema().await.context("failed to prepare job table")?;
    let settings = PostgresSettingsStore::new(pool);
    settings
        .ensure_schema()
        .await
        .context("failed to prepare settings table")?;

    info!("using Postgres job and settings stores");
    Ok((Arc::new(jobs), Arc::new(settings)))
}
