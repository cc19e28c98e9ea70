//! Locally cached revocation list, kept in the settings store.

use tracing::error;

use taskmill_infra::settings::{SettingsError, SettingsStore};

use super::api::RevocationItem;

/// Settings key holding the last ticket seen from the backend.
pub const TICKET_KEY: &str = "proRevocationListTicket";

/// Settings key holding the revoked items for that ticket.
pub const ITEMS_KEY: &str = "proRevocationListItems";

/// Last stored ticket; absent or non-numeric values read as 0.
pub async fn stored_ticket(settings: &dyn SettingsStore) -> Result<u64, SettingsError> {
    Ok(settings
        .get(TICKET_KEY)
        .await?
        .and_then(|v| v.as_u64())
        .unwrap_or(0))
}

/// Snapshot of the revoked items.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevocationList {
    items: Vec<RevocationItem>,
}

impl RevocationList {
    pub fn new(items: Vec<RevocationItem>) -> Self {
        Self { items }
    }

    /// Read the cached list. A corrupt entry is removed and treated as empty.
    pub async fn load(settings: &dyn SettingsStore) -> Result<Self, SettingsError> {
        let Some(value) = settings.get(ITEMS_KEY).await? else {
            return Ok(Self::default());
        };
        match serde_json::from_value::<Vec<RevocationItem>>(value) {
            Ok(items) => Ok(Self { items }),
            Err(e) => {
                error!(error = %e, "failed to parse cached revocation items; removing them");
                settings.remove(ITEMS_KEY).await?;
                Ok(Self::default())
            }
        }
    }

    pub fn items(&self) -> &[RevocationItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// True when `gen_index_hash` is listed and `at_ms` is after its revocation time.
    pub fn is_revoked_at(&self, gen_index_hash: &str, at_ms: i64) -> bool {
        self.items
            .iter()
            .find(|item| item.gen_index_hash.eq_ignore_ascii_case(gen_index_hash))
            .is_some_and(|item| at_ms > item.expiry_unix_ts_ms)
    }
}
