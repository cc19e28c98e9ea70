use anyhow::Context;

use taskmill_daemon::config::DaemonConfig;
use taskmill_daemon::{services, timer};
use taskmill_jobs::Runners;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = DaemonConfig::from_env().context("invalid configuration")?;
    taskmill_observability::tracing::init(&config.log_config());

    tracing::info!(
        environment = ?config.environment,
        persistent = config.database_url.is_some(),
        pro_available = config.pro_available,
        trigger_interval_secs = config.trigger_interval.as_secs(),
        "starting taskmill daemon"
    );

    let deps = services::build_dependencies(&config).await?;
    // Avatar downloads are queued by embedding hosts through
    // `Runners::avatars()`; here the avatar runner resumes persisted ones.
    let runners = Runners::new(deps);
    runners.start_all().await.context("failed to start job runners")?;

    timer::drive_triggers(&runners, config.trigger_interval, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c; shutting down");
        }
    })
    .await;

    runners.stop_all().await;
    tracing::info!("taskmill daemon stopped");
    Ok(())
}
