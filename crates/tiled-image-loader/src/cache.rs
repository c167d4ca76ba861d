//! Persisted tile byte cache

use crate::Result;
use std::path::{Path, PathBuf};
use xxhash_rust::xxh64::xxh64;

/// Byte store addressed by the xxh64 hash of a tile key.
///
/// Entries live at `root/xx/yy/<hash>.tile` where `xx` and `yy` are the first two byte
/// pairs of the hex hash, keeping directories small.
#[derive(Debug, Clone)]
pub struct DiskTileCache {
    root: PathBuf,
}

impl DiskTileCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        let hex = format!("{:016x}", xxh64(key.as_bytes(), 0));
        self.root
            .join(&hex[0..2])
            .join(&hex[2..4])
            .join(format!("{hex}.tile"))
    }

    /// Cached bytes of `key`. Unreadable entries count as misses.
    pub async fn read(&self, key: &str) -> Option<Vec<u8>> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!("Failed to read cached tile {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Store `bytes` under `key`, replacing any previous entry
    pub async fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Readers never see a half-written entry
        let partial = path.with_extension("partial");
        tokio::fs::write(&partial, bytes).await?;
        tokio::fs::rename(&partial, &path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_layout() {
        let cache = DiskTileCache::new("/cache");
        let path = cache.path_for("tiles/0/0/0/0.png");
        let hex = format!("{:016x}", xxh64(b"tiles/0/0/0/0.png", 0));
        assert_eq!(
            path,
            PathBuf::from("/cache")
                .join(&hex[0..2])
                .join(&hex[2..4])
                .join(format!("{hex}.tile"))
        );
        assert_ne!(path, cache.path_for("tiles/0/0/0/1.png"));
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskTileCache::new(dir.path());

        assert_eq!(cache.read("a").await, None);
        cache.write("a", b"hello").await.unwrap();
        assert_eq!(cache.read("a").await, Some(b"hello".to_vec()));

        cache.write("a", b"again").await.unwrap();
        assert_eq!(cache.read("a").await, Some(b"again".to_vec()));
        assert!(!cache.path_for("a").with_extension("partial").exists());
    }
}
