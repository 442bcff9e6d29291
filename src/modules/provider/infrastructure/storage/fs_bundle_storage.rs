use crate::modules::provider::domain::BundleStorage;
use crate::shared::errors::{AppError, AppResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Bundle storage on the local file system
#[derive(Debug, Default, Clone, Copy)]
pub struct FsBundleStorage;

impl FsBundleStorage {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BundleStorage for FsBundleStorage {
    async fn exists(&self, path: &Path) -> bool {
        fs::try_exists(path).await.unwrap_or(false)
    }

    async fn read(&self, path: &Path) -> AppResult<Vec<u8>> {
        Ok(fs::read(path).await?)
    }

    async fn write(&self, path: &Path, bytes: &[u8]) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Readers never observe a partially written bundle
        let tmp = path.with_extension("part");
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, path).await?;

        debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }

    async fn delete(&self, path: &Path) -> AppResult<()> {
        match fs::remove_file(path).await {
            Ok(()) => {
                debug!("Deleted {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::IoError(format!(
                "Failed to delete {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn list_dir(&self, dir: &Path) -> AppResult<Vec<PathBuf>> {
        let mut entries = Vec::new();
        let mut reader = match fs::read_dir(dir).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = reader.next_entry().await? {
            entries.push(entry.path());
        }
        entries.sort();
        Ok(entries)
    }

    async fn remove_dir(&self, dir: &Path) -> AppResult<()> {
        match fs::remove_dir_all(dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_creates_parents_and_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsBundleStorage::new();
        let path = dir.path().join("repo").join("p1.so");

        storage.write(&path, b"bundle").await.unwrap();
        assert!(storage.exists(&path).await);
        assert_eq!(storage.read(&path).await.unwrap(), b"bundle");
        assert!(!storage.exists(&path.with_extension("part")).await);

        storage.delete(&path).await.unwrap();
        storage.delete(&path).await.unwrap();
        assert!(!storage.exists(&path).await);
    }

    #[tokio::test]
    async fn listing_a_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsBundleStorage::new();
        let listed = storage.list_dir(&dir.path().join("nope")).await.unwrap();
        assert!(listed.is_empty());
    }
}
