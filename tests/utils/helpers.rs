/// Runtime builders shared by the integration tests
use super::fakes::{event_log, EventLog, RecordingStorage, ScriptedApi, StaticFetcher, StaticModuleLoader};
use reelhost::modules::provider::{
    domain::{ProviderMetadata, ProviderPreferences, SourceDescriptor},
    infrastructure::InMemoryPreferences,
    LoadResult, LoadedProvider,
};
use reelhost::shared::utils::FixedClock;
use reelhost::{RuntimeConfig, RuntimeContext, RuntimePorts};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

pub const NOW: i64 = 1_700_000_000;

pub struct TestRuntime {
    pub dir: TempDir,
    pub context: RuntimeContext,
    pub modules: Arc<StaticModuleLoader>,
    pub fetcher: Arc<StaticFetcher>,
    pub clock: Arc<FixedClock>,
    pub log: EventLog,
}

/// Runtime over a temporary plugins directory with in-memory bundles
pub fn test_runtime() -> TestRuntime {
    test_runtime_with(RuntimeConfig::default())
}

pub fn test_runtime_with(config: RuntimeConfig) -> TestRuntime {
    test_runtime_with_preferences(config, Arc::new(InMemoryPreferences::new()))
}

pub fn test_runtime_with_preferences(
    config: RuntimeConfig,
    preferences: Arc<dyn ProviderPreferences>,
) -> TestRuntime {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = event_log();
    let modules = Arc::new(StaticModuleLoader::new(log.clone()));
    let fetcher = Arc::new(StaticFetcher::new());
    let clock = Arc::new(FixedClock::new(NOW));

    let config = RuntimeConfig {
        plugins_dir: dir.path().join("plugins"),
        preferences_file: dir.path().join("plugins").join("providers.json"),
        ..config
    };
    let ports = RuntimePorts {
        preferences,
        storage: Arc::new(RecordingStorage::new(log.clone())),
        fetcher: fetcher.clone(),
        modules: modules.clone(),
        clock: clock.clone(),
    };
    let context = RuntimeContext::with_ports(config, reqwest::Client::new(), ports);

    TestRuntime {
        dir,
        context,
        modules,
        fetcher,
        clock,
        log,
    }
}

pub fn bundle_url(id: &str) -> String {
    format!("https://repo.test/bundles/{}.bin", id)
}

pub fn remote_metadata(id: &str, version_code: i64) -> ProviderMetadata {
    ProviderMetadata::new(
        id,
        id.to_uppercase(),
        format!("1.{}", version_code),
        version_code,
        SourceDescriptor::Remote {
            url: bundle_url(id),
        },
    )
    .with_repository("test-repo")
}

impl TestRuntime {
    pub fn bundle_path(&self, metadata: &ProviderMetadata) -> PathBuf {
        self.context.loader.bundle_path_for(metadata)
    }

    /// Download and load a provider serving `api`
    pub async fn install(&self, id: &str, api: Arc<ScriptedApi>) -> Arc<LoadedProvider> {
        self.install_metadata(remote_metadata(id, 1), api).await
    }

    pub async fn install_metadata(
        &self,
        metadata: ProviderMetadata,
        api: Arc<ScriptedApi>,
    ) -> Arc<LoadedProvider> {
        let id = metadata.id.clone();
        if let SourceDescriptor::Remote { url } = &metadata.source {
            self.fetcher.serve(url, b"\x7fELF fake bundle");
        }
        self.modules
            .register_api(&metadata.bundle_file_name(), &id, api);

        match self.context.loader.load_and_wait(metadata, None, false).await {
            LoadResult::Success(loaded) => loaded,
            other => panic!("loading {} failed: {:?}", id, other),
        }
    }

    pub fn events(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}
