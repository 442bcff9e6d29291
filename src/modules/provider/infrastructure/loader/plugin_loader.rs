use super::{
    bundle_fetcher::{BundleFetcher, DownloadProgress},
    module_handle::{LoadedProvider, ModuleLoader},
};
use crate::modules::provider::{
    domain::{BundleStorage, ProviderMetadata, SourceDescriptor},
    infrastructure::registry::{ProviderApiRegistry, ProviderRegistry},
};
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::logger::{LogContext, TimedOperation};
use crate::{log_info, log_warn};
use futures::channel::mpsc;
use futures::stream::{BoxStream, StreamExt};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Repository-level metadata file that may sit next to bundles
pub const UPDATER_SIDECAR: &str = "updater.json";

/// Extension of the per-bundle metadata file written next to each bundle
pub const METADATA_SIDECAR_EXTENSION: &str = "json";

/// Progress and outcome of one plugin load
#[derive(Debug, Clone)]
pub enum LoadResult {
    Downloading(DownloadProgress),
    Loading,
    Success(Arc<LoadedProvider>),
    Failure {
        metadata: ProviderMetadata,
        path: PathBuf,
        error: AppError,
        file_downloaded: bool,
    },
}

impl LoadResult {
    /// Whether the bundle existed on disk when the load failed
    pub fn is_file_downloaded(&self) -> bool {
        match self {
            LoadResult::Failure {
                file_downloaded, ..
            } => *file_downloaded,
            LoadResult::Success(_) => true,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LoadResult::Success(_) | LoadResult::Failure { .. })
    }
}

/// Downloads, loads and unloads provider bundles
pub struct PluginLoader {
    plugins_dir: PathBuf,
    storage: Arc<dyn BundleStorage>,
    fetcher: Arc<dyn BundleFetcher>,
    modules: Arc<dyn ModuleLoader>,
    providers: Arc<ProviderRegistry>,
    apis: Arc<ProviderApiRegistry>,
}

impl PluginLoader {
    pub fn new(
        plugins_dir: impl Into<PathBuf>,
        storage: Arc<dyn BundleStorage>,
        fetcher: Arc<dyn BundleFetcher>,
        modules: Arc<dyn ModuleLoader>,
        providers: Arc<ProviderRegistry>,
        apis: Arc<ProviderApiRegistry>,
    ) -> Self {
        Self {
            plugins_dir: plugins_dir.into(),
            storage,
            fetcher,
            modules,
            providers,
            apis,
        }
    }

    /// Where a remote bundle for `metadata` is stored.
    ///
    /// Every version gets its own file: the platform loader hands back an already
    /// mapped library when asked to open the same path again.
    pub fn bundle_path_for(&self, metadata: &ProviderMetadata) -> PathBuf {
        self.plugins_dir
            .join(metadata.repository_dir_name())
            .join(metadata.bundle_file_name())
    }

    /// Load a provider, downloading its bundle first when no local path is given.
    ///
    /// The returned stream ends after exactly one `Success` or `Failure`.
    pub fn load(
        self: &Arc<Self>,
        metadata: ProviderMetadata,
        local_path: Option<PathBuf>,
        sync_preferences: bool,
    ) -> BoxStream<'static, LoadResult> {
        let (tx, rx) = mpsc::unbounded();
        let loader = Arc::clone(self);

        tokio::spawn(async move {
            let result = loader
                .run_load(metadata, local_path, sync_preferences, &tx)
                .await;
            let _ = tx.unbounded_send(result);
        });

        rx.boxed()
    }

    /// Load and wait for the terminal result
    pub async fn load_and_wait(
        self: &Arc<Self>,
        metadata: ProviderMetadata,
        local_path: Option<PathBuf>,
        sync_preferences: bool,
    ) -> LoadResult {
        let id = metadata.id.clone();
        let mut events = self.load(metadata.clone(), local_path, sync_preferences);
        let mut last = None;
        while let Some(event) = events.next().await {
            last = Some(event);
        }

        last.unwrap_or_else(|| LoadResult::Failure {
            metadata,
            path: PathBuf::new(),
            error: AppError::InternalError(format!("Load task for {} ended silently", id)),
            file_downloaded: false,
        })
    }

    async fn run_load(
        &self,
        metadata: ProviderMetadata,
        local_path: Option<PathBuf>,
        sync_preferences: bool,
        tx: &mpsc::UnboundedSender<LoadResult>,
    ) -> LoadResult {
        let timer = TimedOperation::new(format!("load provider {} ({})", metadata.id, metadata.version_name));

        let path = match (local_path, &metadata.source) {
            (Some(path), _) => path,
            (None, SourceDescriptor::Local { path }) => path.clone(),
            (None, SourceDescriptor::Remote { url }) => {
                let target = self.bundle_path_for(&metadata);
                if let Err(error) = self.download(&metadata, url, &target, tx).await {
                    return self.failure(metadata, target, error).await;
                }
                target
            }
        };

        let _ = tx.unbounded_send(LoadResult::Loading);

        match self.open_and_register(&metadata, &path, sync_preferences).await {
            Ok(loaded) => {
                LogContext::plugin_load(&metadata.id, &metadata.version_name, None);
                timer.finish();
                LoadResult::Success(loaded)
            }
            Err(error) => self.failure(metadata, path, error).await,
        }
    }

    async fn download(
        &self,
        metadata: &ProviderMetadata,
        url: &str,
        target: &Path,
        tx: &mpsc::UnboundedSender<LoadResult>,
    ) -> AppResult<()> {
        let provider_id = metadata.id.clone();
        let progress_tx = tx.clone();
        let on_progress = move |progress: DownloadProgress| {
            LogContext::download_progress(&provider_id, progress.bytes_downloaded, progress.percent);
            let _ = progress_tx.unbounded_send(LoadResult::Downloading(progress));
        };

        let bytes = self.fetcher.fetch(url, &on_progress).await?;
        self.storage.write(target, &bytes).await?;

        let sidecar = serde_json::to_vec_pretty(metadata)?;
        self.storage
            .write(&target.with_extension(METADATA_SIDECAR_EXTENSION), &sidecar)
            .await?;

        log_info!("Downloaded {} to {}", metadata.id, target.display());
        Ok(())
    }

    async fn open_and_register(
        &self,
        metadata: &ProviderMetadata,
        path: &Path,
        sync_preferences: bool,
    ) -> AppResult<Arc<LoadedProvider>> {
        if !self.storage.exists(path).await {
            return Err(AppError::LoadFailure(format!(
                "Bundle {} does not exist",
                path.display()
            )));
        }

        let modules = Arc::clone(&self.modules);
        let open_path = path.to_path_buf();
        let module = tokio::task::spawn_blocking(move || modules.open(&open_path))
            .await
            .map_err(|e| AppError::LoadFailure(format!("Bundle loader task failed: {}", e)))??;

        let instantiate_module = Arc::clone(&module);
        let instantiated = catch_unwind(AssertUnwindSafe(|| {
            LoadedProvider::instantiate(metadata.clone(), path.to_path_buf(), instantiate_module)
        }));
        let loaded = match instantiated {
            Ok(Ok(loaded)) => Arc::new(loaded),
            Ok(Err(error)) => {
                module.dispose();
                return Err(error);
            }
            Err(_) => {
                module.dispose();
                return Err(AppError::LoadFailure(format!(
                    "Provider {} panicked during instantiation",
                    metadata.id
                )));
            }
        };

        // The API must exist before the provider becomes visible to resolutions
        if let Err(error) = self.apis.add_api_from_provider(&metadata.id, &loaded) {
            module.dispose();
            return Err(error);
        }

        if let Some(previous) = self.providers.add(Arc::clone(&loaded), sync_preferences).await {
            self.retire(&previous, &loaded).await;
        }

        Ok(loaded)
    }

    async fn failure(&self, metadata: ProviderMetadata, path: PathBuf, error: AppError) -> LoadResult {
        LogContext::plugin_load(&metadata.id, &metadata.version_name, Some(&error));
        let file_downloaded = !path.as_os_str().is_empty() && self.storage.exists(&path).await;
        LoadResult::Failure {
            metadata,
            path,
            error,
            file_downloaded,
        }
    }

    /// Unload a provider and delete its bundle.
    ///
    /// Registry removal happens before any file is touched; resolutions already
    /// holding the provider's API keep its code mapped until they finish.
    pub async fn unload(&self, id: &str, sync_preferences: bool) -> AppResult<()> {
        let loaded = self
            .providers
            .get_provider(id)
            .await
            .ok_or_else(|| AppError::ProviderNotLoaded(id.to_string()))?;

        LogContext::plugin_unload(id, "running unload hook");
        self.run_unload_hook(&loaded);

        LogContext::plugin_unload(id, "removing from registries");
        self.providers.remove(id, sync_preferences).await;
        self.apis.remove_api(id);
        loaded.module().dispose();

        LogContext::plugin_unload(id, "deleting bundle");
        let bundle = loaded.bundle_path().to_path_buf();
        self.storage.delete(&bundle).await?;
        self.storage
            .delete(&bundle.with_extension(METADATA_SIDECAR_EXTENSION))
            .await?;
        self.remove_leftover_dir(&bundle).await?;

        log_info!("Unloaded provider {}", id);
        Ok(())
    }

    /// Load every bundle under `dir` that has a metadata file next to it
    pub async fn load_local_bundles(self: &Arc<Self>, dir: &Path) -> Vec<LoadResult> {
        let mut results = Vec::new();

        let repositories = match self.storage.list_dir(dir).await {
            Ok(entries) => entries,
            Err(e) => {
                LogContext::error_with_context(&e, &format!("Failed to scan {}", dir.display()));
                return results;
            }
        };

        for repository in repositories {
            let entries = match self.storage.list_dir(&repository).await {
                Ok(entries) => entries,
                Err(_) => continue, // a file, not a repository directory
            };

            for sidecar in entries.iter().filter(|p| is_metadata_sidecar(p)) {
                let bundle = sidecar.with_extension(std::env::consts::DLL_EXTENSION);
                if !entries.contains(&bundle) {
                    log_warn!("Metadata {} has no bundle next to it", sidecar.display());
                    continue;
                }

                let metadata = match self.read_metadata(sidecar).await {
                    Ok(metadata) => metadata,
                    Err(e) => {
                        LogContext::error_with_context(
                            &e,
                            &format!("Skipping unreadable metadata {}", sidecar.display()),
                        );
                        continue;
                    }
                };

                results.push(self.load_and_wait(metadata, Some(bundle), false).await);
            }
        }

        let loaded = results
            .iter()
            .filter(|r| matches!(r, LoadResult::Success(_)))
            .count();
        log_info!(
            "Loaded {}/{} local bundles from {}",
            loaded,
            results.len(),
            dir.display()
        );
        results
    }

    async fn read_metadata(&self, sidecar: &Path) -> AppResult<ProviderMetadata> {
        let raw = self.storage.read(sidecar).await?;
        Ok(serde_json::from_slice(&raw)?)
    }

    fn run_unload_hook(&self, loaded: &LoadedProvider) {
        let ctx = self.apis.contexts().context_for(loaded.id());
        match catch_unwind(AssertUnwindSafe(|| loaded.provider().on_unload(&ctx))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log_warn!("Unload hook of {} failed: {:#}", loaded.id(), e),
            Err(_) => log_warn!("Unload hook of {} panicked", loaded.id()),
        }
    }

    /// A replaced version: run its hook, stop further instantiation and drop its
    /// downloaded files when the replacement lives elsewhere.
    ///
    /// Unlinking a mapped bundle is safe; resolutions still holding the old API
    /// keep running on the mapping.
    async fn retire(&self, previous: &LoadedProvider, current: &LoadedProvider) {
        self.run_unload_hook(previous);
        previous.module().dispose();

        let old_bundle = previous.bundle_path();
        if old_bundle != current.bundle_path() && old_bundle.starts_with(&self.plugins_dir) {
            for path in [
                old_bundle.to_path_buf(),
                old_bundle.with_extension(METADATA_SIDECAR_EXTENSION),
            ] {
                if let Err(e) = self.storage.delete(&path).await {
                    LogContext::error_with_context(
                        &e,
                        &format!("Failed to delete retired bundle file {}", path.display()),
                    );
                }
            }
        }

        log_info!(
            "Retired provider {} version {}",
            previous.id(),
            previous.metadata().version_name
        );
    }

    async fn remove_leftover_dir(&self, bundle: &Path) -> AppResult<()> {
        let Some(parent) = bundle.parent() else {
            return Ok(());
        };
        if parent == self.plugins_dir || parent.as_os_str().is_empty() {
            return Ok(());
        }

        let remaining = self.storage.list_dir(parent).await?;
        let only_sidecar = match remaining.as_slice() {
            [] => true,
            [single] => single.file_name().and_then(|n| n.to_str()) == Some(UPDATER_SIDECAR),
            _ => false,
        };

        if only_sidecar {
            self.storage.remove_dir(parent).await?;
            log_info!("Removed empty bundle directory {}", parent.display());
        }
        Ok(())
    }
}

fn is_metadata_sidecar(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(METADATA_SIDECAR_EXTENSION)
        && path.file_name().and_then(|n| n.to_str()) != Some(UPDATER_SIDECAR)
}
