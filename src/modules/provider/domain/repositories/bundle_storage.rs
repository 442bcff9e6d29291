use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::shared::errors::AppResult;

/// Byte store holding provider bundles on local storage
#[async_trait]
pub trait BundleStorage: Send + Sync {
    async fn exists(&self, path: &Path) -> bool;

    async fn read(&self, path: &Path) -> AppResult<Vec<u8>>;

    /// Write the whole file, creating parent directories as needed
    async fn write(&self, path: &Path, bytes: &[u8]) -> AppResult<()>;

    /// Delete a file; deleting a missing file is not an error
    async fn delete(&self, path: &Path) -> AppResult<()>;

    /// Entries directly inside a directory
    async fn list_dir(&self, dir: &Path) -> AppResult<Vec<PathBuf>>;

    /// Remove a directory and whatever is left in it
    async fn remove_dir(&self, dir: &Path) -> AppResult<()>;
}
