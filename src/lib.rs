pub mod modules;
pub mod shared;

use modules::{
    links::{CachedLinksStore, LinkOrchestrator},
    provider::{
        domain::{BundleStorage, ProviderPreferences},
        infrastructure::{
            loader::{BundleFetcher, DylibModuleLoader, HttpBundleFetcher, ModuleLoader},
            registry::ProviderContextFactory,
            FsBundleStorage, JsonFilePreferences,
        },
        LoadResult, PluginLoader, ProviderApiRegistry, ProviderRegistry,
    },
};
use shared::utils::{logger::init_logger, Clock, SystemClock};
use std::sync::Arc;

pub use shared::{AppError, AppResult, RuntimeConfig};

/// Every component of the provider host, wired together
pub struct RuntimeContext {
    pub config: RuntimeConfig,
    pub providers: Arc<ProviderRegistry>,
    pub apis: Arc<ProviderApiRegistry>,
    pub loader: Arc<PluginLoader>,
    pub cache: Arc<CachedLinksStore>,
    pub orchestrator: LinkOrchestrator,
}

/// External collaborators the runtime is built from
pub struct RuntimePorts {
    pub preferences: Arc<dyn ProviderPreferences>,
    pub storage: Arc<dyn BundleStorage>,
    pub fetcher: Arc<dyn BundleFetcher>,
    pub modules: Arc<dyn ModuleLoader>,
    pub clock: Arc<dyn Clock>,
}

impl RuntimeContext {
    /// Build the runtime with on-disk storage and native bundles, then restore
    /// the persisted provider order
    pub async fn initialize(config: RuntimeConfig) -> AppResult<Self> {
        init_logger();

        let http = config.http_client()?;
        let ports = RuntimePorts {
            preferences: Arc::new(JsonFilePreferences::new(&config.preferences_file)),
            storage: Arc::new(FsBundleStorage::new()),
            fetcher: Arc::new(HttpBundleFetcher::new(http.clone())),
            modules: Arc::new(DylibModuleLoader::new()),
            clock: Arc::new(SystemClock),
        };

        let context = Self::with_ports(config, http, ports);
        context.providers.restore_order().await?;

        log::info!(
            "Provider runtime ready (plugins in {})",
            context.config.plugins_dir.display()
        );
        Ok(context)
    }

    pub fn with_ports(config: RuntimeConfig, http: reqwest::Client, ports: RuntimePorts) -> Self {
        let providers = Arc::new(ProviderRegistry::new(ports.preferences));
        let apis = Arc::new(ProviderApiRegistry::new(
            Arc::clone(&providers),
            ProviderContextFactory::new(http, config.plugins_dir.join("data")),
        ));
        let loader = Arc::new(PluginLoader::new(
            config.plugins_dir.clone(),
            ports.storage,
            ports.fetcher,
            ports.modules,
            Arc::clone(&providers),
            Arc::clone(&apis),
        ));
        let cache = Arc::new(CachedLinksStore::new(ports.clock));
        let orchestrator = LinkOrchestrator::new(
            Arc::clone(&providers),
            Arc::clone(&apis),
            Arc::clone(&cache),
            &config,
        );

        Self {
            config,
            providers,
            apis,
            loader,
            cache,
            orchestrator,
        }
    }

    /// Load every bundle already installed under the plugins directory
    pub async fn load_installed(&self) -> Vec<LoadResult> {
        self.loader.load_local_bundles(&self.config.plugins_dir).await
    }
}
