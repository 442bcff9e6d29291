use crate::modules::provider::{
    domain::ProviderMetadata,
    traits::{Provider, PROVIDER_API_VERSION},
};
use crate::shared::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Constructor exported by a bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPoint {
    /// Exported symbol building the provider object
    pub symbol: String,
    /// Provider id this entry point serves; `None` when the bundle has a single provider
    #[serde(default)]
    pub provider_id: Option<String>,
}

/// Self-description embedded in every bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleManifest {
    pub api_version: u32,
    pub entry_points: Vec<EntryPoint>,
    #[serde(default)]
    pub name: Option<String>,
}

impl BundleManifest {
    pub fn validate(&self) -> AppResult<()> {
        if self.api_version != PROVIDER_API_VERSION {
            return Err(AppError::LoadFailure(format!(
                "Incompatible provider API version {} (host supports {})",
                self.api_version, PROVIDER_API_VERSION
            )));
        }

        if self.entry_points.is_empty() {
            return Err(AppError::LoadFailure(
                "Manifest declares no entry point".to_string(),
            ));
        }

        if let Some(blank) = self
            .entry_points
            .iter()
            .find(|entry| entry.symbol.trim().is_empty())
        {
            return Err(AppError::LoadFailure(format!(
                "Manifest entry point for {:?} has an empty symbol",
                blank.provider_id
            )));
        }

        Ok(())
    }

    /// Pick the entry point serving `provider_id`
    pub fn entry_point_for(&self, provider_id: &str) -> AppResult<&EntryPoint> {
        if let Some(entry) = self
            .entry_points
            .iter()
            .find(|entry| entry.provider_id.as_deref() == Some(provider_id))
        {
            return Ok(entry);
        }

        match self.entry_points.as_slice() {
            [single] if single.provider_id.is_none() => Ok(single),
            _ => Err(AppError::LoadFailure(format!(
                "Manifest has no entry point for provider {}",
                provider_id
            ))),
        }
    }
}

/// Code loaded from one bundle into its own execution context.
///
/// Provider objects created by a module reference its code, so anything built by
/// `instantiate` must be dropped before the last `Arc` to the module.
pub trait ModuleHandle: Send + Sync {
    fn manifest(&self) -> &BundleManifest;

    fn instantiate(&self, entry_point: &EntryPoint) -> AppResult<Box<dyn Provider>>;

    /// Refuse further instantiation. The code stays mapped until the last handle drops.
    fn dispose(&self);

    fn is_disposed(&self) -> bool;
}

/// Opens bundles on local storage
pub trait ModuleLoader: Send + Sync {
    fn open(&self, path: &Path) -> AppResult<Arc<dyn ModuleHandle>>;
}

/// A provider instantiated from a bundle, tied to the module that holds its code
pub struct LoadedProvider {
    metadata: ProviderMetadata,
    bundle_path: PathBuf,
    // Declared before `module`: dropped first.
    provider: Arc<dyn Provider>,
    module: Arc<dyn ModuleHandle>,
}

impl LoadedProvider {
    pub fn new(
        metadata: ProviderMetadata,
        bundle_path: PathBuf,
        provider: Box<dyn Provider>,
        module: Arc<dyn ModuleHandle>,
    ) -> Self {
        Self {
            metadata,
            bundle_path,
            provider: Arc::from(provider),
            module,
        }
    }

    /// Instantiate the entry point serving `metadata.id` from an opened module
    pub fn instantiate(
        metadata: ProviderMetadata,
        bundle_path: PathBuf,
        module: Arc<dyn ModuleHandle>,
    ) -> AppResult<Self> {
        let entry_point = module.manifest().entry_point_for(&metadata.id)?.clone();
        let provider = module.instantiate(&entry_point)?;
        Ok(Self::new(metadata, bundle_path, provider, module))
    }

    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    pub fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    pub fn bundle_path(&self) -> &Path {
        &self.bundle_path
    }

    pub fn provider(&self) -> &dyn Provider {
        self.provider.as_ref()
    }

    pub fn module(&self) -> Arc<dyn ModuleHandle> {
        Arc::clone(&self.module)
    }

    pub fn is_alive(&self) -> bool {
        !self.module.is_disposed()
    }
}

impl std::fmt::Debug for LoadedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedProvider")
            .field("id", &self.metadata.id)
            .field("version", &self.metadata.version_name)
            .field("bundle_path", &self.bundle_path)
            .field("alive", &self.is_alive())
            .finish()
    }
}
