//! Periodic trigger timer.

use std::future::Future;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use taskmill_jobs::{Runners, TriggerOutcome};

/// Queue a startup refresh, then ask the revocation trigger for work every
/// `every` until `shutdown` resolves.
pub async fn drive_triggers<S>(runners: &Runners, every: Duration, shutdown: S)
where
    S: Future<Output = ()>,
{
    match runners.revocation().run_on_startup().await {
        Ok(outcome) => debug!(?outcome, "startup revocation refresh requested"),
        Err(e) => error!(error = %e, "failed to queue startup revocation refresh"),
    }

    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately and the startup refresh covers it.
    ticker.tick().await;

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown requested; trigger timer stopping");
                break;
            }
            _ = ticker.tick() => {
                match runners.revocation().queue_new_job_if_needed().await {
                    Ok(TriggerOutcome::Queued(job_id)) => debug!(%job_id, "revocation refresh queued"),
                    Ok(outcome) => debug!(?outcome, "revocation refresh not queued"),
                    Err(e) => error!(error = %e, "failed to queue revocation refresh"),
                }
            }
        }
    }
}
