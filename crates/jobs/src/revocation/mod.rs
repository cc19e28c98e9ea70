//! Pro revocation list refresh.

pub mod api;
pub mod job;
pub mod list;
pub mod trigger;

use std::sync::Arc;

use taskmill_infra::jobs::{Job, JobTypeRegistry};

pub use api::{RevocationApi, RevocationApiError, RevocationItem, RevocationResponse, RevocationResult};
pub use job::{RevocationContext, UPDATE_REVOCATION_LIST_JOB_TYPE, UpdateRevocationListJob};
pub use list::RevocationList;
pub use trigger::RevocationTrigger;

/// Teach `registry` to rebuild revocation jobs around `ctx`.
pub fn register(registry: &mut JobTypeRegistry, ctx: RevocationContext) {
    registry.register(UPDATE_REVOCATION_LIST_JOB_TYPE, move |payload| {
        serde_json::from_value::<job::NoPayload>(payload.clone())?;
        Ok(Arc::new(UpdateRevocationListJob::new(ctx.clone())) as Arc<dyn Job>)
    });
}
