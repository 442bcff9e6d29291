use crate::modules::provider::domain::{ProviderPreference, ProviderPreferences};
use crate::shared::errors::AppResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Default, Serialize, Deserialize)]
struct PreferencesFile {
    #[serde(default)]
    providers: Vec<ProviderPreference>,
}

/// Provider preferences persisted as a JSON document
#[derive(Debug)]
pub struct JsonFilePreferences {
    path: PathBuf,
    // Serialises read-modify-write cycles against the file
    lock: RwLock<()>,
}

impl JsonFilePreferences {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: RwLock::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ProviderPreferences for JsonFilePreferences {
    async fn load(&self) -> AppResult<Vec<ProviderPreference>> {
        let _guard = self.lock.read().await;

        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let file: PreferencesFile = serde_json::from_slice(&raw)?;
        debug!(
            "Loaded {} provider preferences from {}",
            file.providers.len(),
            self.path.display()
        );
        Ok(file.providers)
    }

    async fn save(&self, preferences: &[ProviderPreference]) -> AppResult<()> {
        let _guard = self.lock.write().await;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file = PreferencesFile {
            providers: preferences.to_vec(),
        };
        let json = serde_json::to_vec_pretty(&file)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// Preferences kept only for the lifetime of the process
#[derive(Debug, Default)]
pub struct InMemoryPreferences {
    preferences: RwLock<Vec<ProviderPreference>>,
}

impl InMemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_preferences(preferences: Vec<ProviderPreference>) -> Self {
        Self {
            preferences: RwLock::new(preferences),
        }
    }
}

#[async_trait]
impl ProviderPreferences for InMemoryPreferences {
    async fn load(&self) -> AppResult<Vec<ProviderPreference>> {
        Ok(self.preferences.read().await.clone())
    }

    async fn save(&self, preferences: &[ProviderPreference]) -> AppResult<()> {
        *self.preferences.write().await = preferences.to_vec();
        Ok(())
    }
}
