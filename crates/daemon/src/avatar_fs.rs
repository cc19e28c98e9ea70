//! Filesystem avatar cache.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use taskmill_jobs::{AvatarCache, AvatarCacheError};

/// Writes one file per conversation under a base directory.
///
/// File names are the hex-encoded conversation id, so distinct ids never share
/// a file. Files are written to a temporary name and renamed into place;
/// readers never see a partially written avatar.
#[derive(Debug, Clone)]
pub struct FsAvatarCache {
    dir: PathBuf,
}

impl FsAvatarCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, conversation_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}.avatar", hex::encode(conversation_id.as_bytes())))
    }
}

#[async_trait]
impl AvatarCache for FsAvatarCache {
    async fn save(&self, conversation_id: &str, _url: &str, bytes: &[u8]) -> Result<(), AvatarCacheError> {
        let io = |e: std::io::Error| AvatarCacheError(e.to_string());

        tokio::fs::create_dir_all(&self.dir).await.map_err(io)?;
        let target = self.path_for(conversation_id);
        let staging = target.with_extension(format!("{}.tmp", uuid::Uuid::now_v7().simple()));
        let written = match tokio::fs::write(&staging, bytes).await {
            Ok(()) => tokio::fs::rename(&staging, &target).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            if let Err(cleanup) = tokio::fs::remove_file(&staging).await {
                debug!(path = %staging.display(), error = %cleanup, "staging file not removed");
            }
            return Err(io(e));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_ids_map_to_distinct_safe_file_names() {
        let cache = FsAvatarCache::new("/tmp/avatars");
        assert_eq!(cache.path_for("05ab"), PathBuf::from("/tmp/avatars/30356162.avatar"));

        let slashed = cache.path_for("a/b");
        let underscored = cache.path_for("a_b");
        assert_ne!(slashed, underscored);
        assert_eq!(slashed.parent(), Some(Path::new("/tmp/avatars")));
        assert_eq!(underscored.parent(), Some(Path::new("/tmp/avatars")));
    }

    #[tokio::test]
    async fn failed_rename_leaves_no_staging_file() {
        let dir = std::env::temp_dir().join(format!("taskmill-avatars-{}", uuid::Uuid::now_v7()));
        let cache = FsAvatarCache::new(&dir);
        // A non-empty directory at the target path makes the rename fail.
        let target = cache.path_for("c1");
        std::fs::create_dir_all(target.join("occupied")).unwrap();

        assert!(cache.save("c1", "u1", b"bytes").await.is_err());

        let entries: Vec<_> = std::fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(entries, vec![target]);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn save_overwrites_previous_avatar() {
        let dir = std::env::temp_dir().join(format!("taskmill-avatars-{}", uuid::Uuid::now_v7()));
        let cache = FsAvatarCache::new(&dir);

        cache.save("c1", "u1", b"first").await.unwrap();
        cache.save("c1", "u2", b"second").await.unwrap();

        let stored = tokio::fs::read(cache.path_for("c1")).await.unwrap();
        assert_eq!(stored, b"second");
        let entries = std::fs::read_dir(&dir).unwrap().count();
        assert_eq!(entries, 1);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
