//! `taskmill-jobs`
//!
//! **Responsibility:** concrete background jobs and the functions that queue them.
//!
//! - Jobs receive their collaborators (remote API, settings, feature flags)
//!   through constructors; nothing here reaches for globals.
//! - Each job kind is registered with a `JobTypeRegistry` so persisted records
//!   can be turned back into runnable jobs after a restart.
//! - `Runners` wires one `JobRunner` per queue and is built once by the host.

pub mod avatar;
pub mod flags;
pub mod revocation;
pub mod runners;
pub mod trigger;

#[cfg(test)]
pub(crate) mod testing;

pub use avatar::{
    AVATAR_DOWNLOAD_JOB_TYPE, AvatarCache, AvatarCacheError, AvatarContext, AvatarDownload,
    AvatarDownloadJob, AvatarFetcher, AvatarTrigger, CachedAvatar, FetchError, InMemoryAvatarCache,
};
pub use flags::{FeatureFlags, PRO_AVAILABLE, StaticFeatureFlags};
pub use revocation::{
    RevocationApi, RevocationApiError, RevocationContext, RevocationItem, RevocationList,
    RevocationResponse, RevocationResult, RevocationTrigger, UPDATE_REVOCATION_LIST_JOB_TYPE,
    UpdateRevocationListJob,
};
pub use runners::{JobDependencies, Runners};
pub use trigger::TriggerOutcome;
