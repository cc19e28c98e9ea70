//! Conversation avatar downloads.

pub mod io;
pub mod job;
pub mod trigger;

use std::sync::Arc;

use taskmill_infra::jobs::{Job, JobTypeRegistry};

pub use io::{AvatarCache, AvatarCacheError, AvatarFetcher, CachedAvatar, FetchError, InMemoryAvatarCache};
pub use job::{AVATAR_DOWNLOAD_JOB_TYPE, AvatarContext, AvatarDownload, AvatarDownloadJob};
pub use trigger::AvatarTrigger;

/// Teach `registry` to rebuild avatar jobs around `ctx`.
pub fn register(registry: &mut JobTypeRegistry, ctx: AvatarContext) {
    registry.register(AVATAR_DOWNLOAD_JOB_TYPE, move |payload| {
        let request: AvatarDownload = serde_json::from_value(payload.clone())?;
        Ok(Arc::new(AvatarDownloadJob::new(request, ctx.clone())) as Arc<dyn Job>)
    });
}
