//! Boundary to the pro backend revocation endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Revoked pro proof: the generation-index hash (hex) and when it stops being valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationItem {
    pub expiry_unix_ts_ms: i64,
    pub gen_index_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationResult {
    pub ticket: u64,
    #[serde(default)]
    pub items: Vec<RevocationItem>,
}

/// Response envelope of `POST /get_pro_revocations`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationResponse {
    pub status_code: u16,
    #[serde(default)]
    pub result: Option<RevocationResult>,
}

impl RevocationResponse {
    pub fn ok(ticket: u64, items: Vec<RevocationItem>) -> Self {
        Self {
            status_code: 200,
            result: Some(RevocationResult { ticket, items }),
        }
    }

    pub fn status(status_code: u16) -> Self {
        Self {
            status_code,
            result: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RevocationApiError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid response: {0}")]
    Decode(String),
}

/// Client for the revocation list endpoint.
#[async_trait]
pub trait RevocationApi: Send + Sync + 'static {
    /// Fetch revocations newer than `ticket`.
    async fn get_revocations(&self, ticket: u64) -> Result<RevocationResponse, RevocationApiError>;
}
