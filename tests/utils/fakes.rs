/// In-process stand-ins for bundles, provider APIs and downloads
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use reelhost::modules::provider::{
    domain::{
        BundleStorage, Episode, FilmDetails, FilmType, MediaLink, ProviderPreference,
        ProviderPreferences, SearchItem, SearchResponse, Stream, Subtitle,
    },
    infrastructure::{
        loader::{
            BundleFetcher, BundleManifest, DownloadProgress, EntryPoint, ModuleHandle,
            ModuleLoader, ProgressCallback,
        },
        FsBundleStorage,
    },
    Provider, ProviderApi, ProviderContext, PROVIDER_API_VERSION,
};
use reelhost::{AppError, AppResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Shared record of lifecycle calls, in order
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// One item a scripted provider yields from `get_links`
#[derive(Debug, Clone)]
pub enum LinkStep {
    Stream(Stream),
    Subtitle(Subtitle),
    Fail(String),
    /// Never completes; used to hold a resolution open
    Hang,
}

/// Provider API answering from a fixed script
pub struct ScriptedApi {
    pub search_results: Vec<SearchItem>,
    pub episodes: Vec<Episode>,
    pub steps: Vec<LinkStep>,
    pub fail_search: bool,
    pub thumbnail: Option<String>,
    pub search_calls: AtomicUsize,
    pub link_calls: AtomicUsize,
    /// Watch ids `get_links` was called with
    pub watch_ids: Mutex<Vec<String>>,
    /// Film id and episode id `get_links` was called with
    pub link_inputs: Mutex<Vec<(String, Option<String>)>>,
    pub metadata_calls: AtomicUsize,
}

impl ScriptedApi {
    pub fn new(steps: Vec<LinkStep>) -> Self {
        Self {
            search_results: Vec::new(),
            episodes: Vec::new(),
            steps,
            fail_search: false,
            thumbnail: None,
            search_calls: AtomicUsize::new(0),
            link_calls: AtomicUsize::new(0),
            watch_ids: Mutex::new(Vec::new()),
            link_inputs: Mutex::new(Vec::new()),
            metadata_calls: AtomicUsize::new(0),
        }
    }

    /// Search answers with one hit for `title`
    pub fn finding(mut self, id: &str, title: &str, film_type: FilmType, year: Option<i32>) -> Self {
        self.search_results.push(SearchItem {
            id: id.to_string(),
            title: title.to_string(),
            film_type,
            year,
            poster: None,
        });
        self
    }

    pub fn with_episodes(mut self, episodes: Vec<Episode>) -> Self {
        self.episodes = episodes;
        self
    }

    pub fn failing_search(mut self) -> Self {
        self.fail_search = true;
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: &str) -> Self {
        self.thumbnail = Some(thumbnail.to_string());
        self
    }
}

#[async_trait]
impl ProviderApi for ScriptedApi {
    async fn search(&self, _query: &str, page: u32) -> anyhow::Result<SearchResponse> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_search {
            anyhow::bail!("search endpoint returned 503");
        }
        Ok(SearchResponse {
            page,
            results: self.search_results.clone(),
            has_next_page: false,
        })
    }

    async fn get_metadata(&self, item: &SearchItem) -> anyhow::Result<FilmDetails> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        let details = match item.film_type {
            FilmType::Movie => FilmDetails::movie(&item.id, &item.title, item.year),
            FilmType::TvShow => FilmDetails::tv_show(&item.id, &item.title, item.year),
        };
        Ok(details.with_episodes(self.episodes.clone()))
    }

    fn get_links<'a>(
        &'a self,
        watch_id: &'a str,
        film: &'a FilmDetails,
        episode: Option<&'a Episode>,
    ) -> BoxStream<'a, anyhow::Result<MediaLink>> {
        self.link_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut ids) = self.watch_ids.lock() {
            ids.push(watch_id.to_string());
        }
        if let Ok(mut inputs) = self.link_inputs.lock() {
            inputs.push((film.id.clone(), episode.and_then(|e| e.id.clone())));
        }

        stream::iter(self.steps.clone())
            .then(|step| async move {
                match step {
                    LinkStep::Stream(stream) => Some(Ok(MediaLink::Stream(stream))),
                    LinkStep::Subtitle(subtitle) => Some(Ok(MediaLink::Subtitle(subtitle))),
                    LinkStep::Fail(message) => Some(Err(anyhow::anyhow!(message))),
                    LinkStep::Hang => {
                        futures::future::pending::<Option<anyhow::Result<MediaLink>>>().await
                    }
                }
            })
            .filter_map(|item| async move { item })
            .boxed()
    }

    fn thumbnail(&self) -> Option<String> {
        self.thumbnail.clone()
    }
}

/// Provider object handing out a shared scripted API
pub struct ScriptedProvider {
    pub id: String,
    pub api: Arc<ScriptedApi>,
    pub log: EventLog,
    pub fail_unload: bool,
}

impl Provider for ScriptedProvider {
    fn create_api(&self, _ctx: &ProviderContext) -> anyhow::Result<Arc<dyn ProviderApi>> {
        let api: Arc<dyn ProviderApi> = self.api.clone();
        Ok(api)
    }

    fn on_unload(&self, ctx: &ProviderContext) -> anyhow::Result<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("on_unload:{}", ctx.provider_id));
        if self.fail_unload {
            anyhow::bail!("cleanup failed");
        }
        Ok(())
    }
}

type ProviderFactory = Arc<dyn Fn() -> Option<Box<dyn Provider>> + Send + Sync>;

/// Module whose entry point runs a Rust closure
pub struct StaticModule {
    manifest: BundleManifest,
    factory: ProviderFactory,
    disposed: AtomicBool,
    log: EventLog,
    path: PathBuf,
}

impl ModuleHandle for StaticModule {
    fn manifest(&self) -> &BundleManifest {
        &self.manifest
    }

    fn instantiate(&self, _entry_point: &EntryPoint) -> AppResult<Box<dyn Provider>> {
        if self.is_disposed() {
            return Err(AppError::LoadFailure("module disposed".to_string()));
        }
        (self.factory)()
            .ok_or_else(|| AppError::LoadFailure("constructor returned null".to_string()))
    }

    fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        self.log
            .lock()
            .unwrap()
            .push(format!("dispose:{}", self.path.display()));
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

/// Module loader serving registered bundle file names from memory.
///
/// The bundle file must still exist on disk for `open` to succeed. Like the
/// platform loader, opening a path that is still mapped by a live module yields
/// that module's code, whatever is registered for the file name now.
pub struct StaticModuleLoader {
    bundles: Mutex<HashMap<String, (u32, ProviderFactory)>>,
    mapped: Mutex<HashMap<PathBuf, Weak<StaticModule>>>,
    log: EventLog,
}

impl StaticModuleLoader {
    pub fn new(log: EventLog) -> Self {
        Self {
            bundles: Mutex::new(HashMap::new()),
            mapped: Mutex::new(HashMap::new()),
            log,
        }
    }

    /// Serve `file_name` with a provider built by `factory`
    pub fn register<F>(&self, file_name: &str, factory: F)
    where
        F: Fn() -> Option<Box<dyn Provider>> + Send + Sync + 'static,
    {
        self.register_with_version(file_name, PROVIDER_API_VERSION, factory);
    }

    pub fn register_with_version<F>(&self, file_name: &str, api_version: u32, factory: F)
    where
        F: Fn() -> Option<Box<dyn Provider>> + Send + Sync + 'static,
    {
        self.bundles
            .lock()
            .unwrap()
            .insert(file_name.to_string(), (api_version, Arc::new(factory)));
    }

    /// Serve `file_name` with a scripted provider around `api`
    pub fn register_api(&self, file_name: &str, id: &str, api: Arc<ScriptedApi>) {
        let log = self.log.clone();
        let id = id.to_string();
        self.register(file_name, move || {
            let provider: Box<dyn Provider> = Box::new(ScriptedProvider {
                id: id.clone(),
                api: api.clone(),
                log: log.clone(),
                fail_unload: false,
            });
            Some(provider)
        });
    }
}

impl ModuleLoader for StaticModuleLoader {
    fn open(&self, path: &Path) -> AppResult<Arc<dyn ModuleHandle>> {
        if !path.is_file() {
            return Err(AppError::LoadFailure(format!(
                "Bundle {} is not a readable file",
                path.display()
            )));
        }

        let still_mapped = self
            .mapped
            .lock()
            .unwrap()
            .get(path)
            .and_then(Weak::upgrade);
        if let Some(live) = still_mapped {
            let module = Arc::new(StaticModule {
                manifest: live.manifest.clone(),
                factory: live.factory.clone(),
                disposed: AtomicBool::new(false),
                log: self.log.clone(),
                path: path.to_path_buf(),
            });
            self.remember(path, &module);
            return Ok(module);
        }

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let (api_version, factory) = self
            .bundles
            .lock()
            .unwrap()
            .get(&file_name)
            .cloned()
            .ok_or_else(|| AppError::LoadFailure(format!("Corrupt bundle {}", file_name)))?;

        let manifest = BundleManifest {
            api_version,
            entry_points: vec![EntryPoint {
                symbol: "make_provider".to_string(),
                provider_id: None,
            }],
            name: Some(file_name),
        };
        manifest.validate()?;

        let module = Arc::new(StaticModule {
            manifest,
            factory,
            disposed: AtomicBool::new(false),
            log: self.log.clone(),
            path: path.to_path_buf(),
        });
        self.remember(path, &module);
        Ok(module)
    }
}

impl StaticModuleLoader {
    fn remember(&self, path: &Path, module: &Arc<StaticModule>) {
        self.mapped
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), Arc::downgrade(module));
    }
}

/// Fetcher returning fixed bytes, or failing like an unreachable host
pub struct StaticFetcher {
    payloads: Mutex<HashMap<String, Vec<u8>>>,
    pub calls: AtomicUsize,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self {
            payloads: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn serve(&self, url: &str, bytes: &[u8]) {
        self.payloads
            .lock()
            .unwrap()
            .insert(url.to_string(), bytes.to_vec());
    }
}

#[async_trait]
impl BundleFetcher for StaticFetcher {
    async fn fetch(&self, url: &str, progress: ProgressCallback<'_>) -> AppResult<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let bytes = self
            .payloads
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| AppError::DownloadFailure(format!("404 for {}", url)))?;

        let total = bytes.len() as u64;
        progress(DownloadProgress::new(0, Some(total), false));
        progress(DownloadProgress::new(total / 2, Some(total), false));
        progress(DownloadProgress::new(total, Some(total), true));
        Ok(bytes)
    }
}

/// File-system storage that records deletions in the event log
pub struct RecordingStorage {
    inner: FsBundleStorage,
    log: EventLog,
}

impl RecordingStorage {
    pub fn new(log: EventLog) -> Self {
        Self {
            inner: FsBundleStorage::new(),
            log,
        }
    }
}

#[async_trait]
impl BundleStorage for RecordingStorage {
    async fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path).await
    }

    async fn read(&self, path: &Path) -> AppResult<Vec<u8>> {
        self.inner.read(path).await
    }

    async fn write(&self, path: &Path, bytes: &[u8]) -> AppResult<()> {
        self.inner.write(path, bytes).await
    }

    async fn delete(&self, path: &Path) -> AppResult<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("delete:{}", path.display()));
        self.inner.delete(path).await
    }

    async fn list_dir(&self, dir: &Path) -> AppResult<Vec<PathBuf>> {
        self.inner.list_dir(dir).await
    }

    async fn remove_dir(&self, dir: &Path) -> AppResult<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("remove_dir:{}", dir.display()));
        self.inner.remove_dir(dir).await
    }
}

/// Preferences store whose writes always fail, like a read-only disk
#[derive(Default)]
pub struct UnwritablePreferences {
    pub save_attempts: AtomicUsize,
}

#[async_trait]
impl ProviderPreferences for UnwritablePreferences {
    async fn load(&self) -> AppResult<Vec<ProviderPreference>> {
        Ok(Vec::new())
    }

    async fn save(&self, _preferences: &[ProviderPreference]) -> AppResult<()> {
        self.save_attempts.fetch_add(1, Ordering::SeqCst);
        Err(AppError::IoError("read-only file system".to_string()))
    }
}
