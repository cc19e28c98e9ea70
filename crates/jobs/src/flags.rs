//! Feature-flag evaluation seen by jobs.

use std::collections::HashSet;
use std::sync::RwLock;

/// Gate for paid ("pro") features; the revocation job is a no-op while off.
pub const PRO_AVAILABLE: &str = "proAvailable";

pub trait FeatureFlags: Send + Sync + 'static {
    fn is_enabled(&self, flag: &str) -> bool;
}

/// Flags fixed at startup, switchable at runtime (tests, admin hooks).
#[derive(Debug, Default)]
pub struct StaticFeatureFlags {
    enabled: RwLock<HashSet<String>>,
}

impl StaticFeatureFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, flag: impl Into<String>) -> Self {
        self.set(flag, true);
        self
    }

    pub fn set(&self, flag: impl Into<String>, enabled: bool) {
        let mut flags = self.enabled.write().unwrap_or_else(|p| p.into_inner());
        let flag = flag.into();
        if enabled {
            flags.insert(flag);
        } else {
            flags.remove(&flag);
        }
    }
}

impl FeatureFlags for StaticFeatureFlags {
    fn is_enabled(&self, flag: &str) -> bool {
        self.enabled
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .contains(flag)
    }
}
