//! In-process stand-ins for bundles, shared by unit tests.

use super::domain::{
    Episode, FilmDetails, MediaLink, ProviderMetadata, SearchItem, SearchResponse,
    SourceDescriptor,
};
use super::infrastructure::loader::{BundleManifest, EntryPoint, LoadedProvider, ModuleHandle};
use super::traits::{Provider, ProviderApi, ProviderContext, PROVIDER_API_VERSION};
use crate::shared::errors::{AppError, AppResult};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub(crate) struct FakeModule {
    manifest: BundleManifest,
    disposed: AtomicBool,
}

impl FakeModule {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            manifest: BundleManifest {
                api_version: PROVIDER_API_VERSION,
                entry_points: vec![EntryPoint {
                    symbol: "make_provider".to_string(),
                    provider_id: None,
                }],
                name: None,
            },
            disposed: AtomicBool::new(false),
        })
    }
}

impl ModuleHandle for FakeModule {
    fn manifest(&self) -> &BundleManifest {
        &self.manifest
    }

    fn instantiate(&self, _entry_point: &EntryPoint) -> AppResult<Box<dyn Provider>> {
        if self.is_disposed() {
            return Err(AppError::LoadFailure("module disposed".to_string()));
        }
        Ok(Box::new(FakeProvider))
    }

    fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

pub(crate) struct FakeProvider;

impl Provider for FakeProvider {
    fn create_api(&self, _ctx: &ProviderContext) -> anyhow::Result<Arc<dyn ProviderApi>> {
        Ok(Arc::new(FakeApi))
    }
}

/// Finds nothing and produces no links
pub(crate) struct FakeApi;

#[async_trait]
impl ProviderApi for FakeApi {
    async fn search(&self, _query: &str, page: u32) -> anyhow::Result<SearchResponse> {
        Ok(SearchResponse {
            page,
            ..SearchResponse::default()
        })
    }

    async fn get_metadata(&self, item: &SearchItem) -> anyhow::Result<FilmDetails> {
        Ok(FilmDetails::movie(&item.id, &item.title, item.year))
    }

    fn get_links<'a>(
        &'a self,
        _watch_id: &'a str,
        _film: &'a FilmDetails,
        _episode: Option<&'a Episode>,
    ) -> BoxStream<'a, anyhow::Result<MediaLink>> {
        stream::empty().boxed()
    }
}

pub(crate) fn metadata(id: &str, version_code: i64) -> ProviderMetadata {
    ProviderMetadata::new(
        id,
        id.to_uppercase(),
        format!("1.0.{}", version_code),
        version_code,
        SourceDescriptor::Remote {
            url: format!("https://repo.test/{}.bin", id),
        },
    )
}

pub(crate) fn loaded_provider(id: &str, version_code: i64) -> Arc<LoadedProvider> {
    let module: Arc<dyn ModuleHandle> = FakeModule::new();
    let loaded = LoadedProvider::instantiate(
        metadata(id, version_code),
        format!("/plugins/local/{}.bin", id).into(),
        module,
    );
    match loaded {
        Ok(loaded) => Arc::new(loaded),
        Err(e) => panic!("fake module failed to instantiate: {}", e),
    }
}
