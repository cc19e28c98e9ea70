//! Download and storage boundaries of the avatar job.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The file is gone; retrying cannot help.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("transient fetch failure: {0}")]
    Transient(String),
}

#[async_trait]
pub trait AvatarFetcher: Send + Sync + 'static {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("avatar cache error: {0}")]
pub struct AvatarCacheError(pub String);

/// Local storage for downloaded avatars, keyed by conversation.
#[async_trait]
pub trait AvatarCache: Send + Sync + 'static {
    async fn save(&self, conversation_id: &str, url: &str, bytes: &[u8]) -> Result<(), AvatarCacheError>;
}

/// A stored avatar: source URL and bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedAvatar {
    pub url: String,
    pub bytes: Vec<u8>,
}

/// In-memory avatar cache for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryAvatarCache {
    avatars: RwLock<HashMap<String, CachedAvatar>>,
}

impl InMemoryAvatarCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, conversation_id: &str) -> Option<CachedAvatar> {
        self.avatars
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(conversation_id)
            .cloned()
    }
}

#[async_trait]
impl AvatarCache for InMemoryAvatarCache {
    async fn save(&self, conversation_id: &str, url: &str, bytes: &[u8]) -> Result<(), AvatarCacheError> {
        let mut avatars = self
            .avatars
            .write()
            .map_err(|_| AvatarCacheError("avatar cache lock poisoned".to_string()))?;
        avatars.insert(
            conversation_id.to_string(),
            CachedAvatar {
                url: url.to_string(),
                bytes: bytes.to_vec(),
            },
        );
        Ok(())
    }
}
