use crate::modules::provider::domain::{Episode, FilmDetails, MediaLink, SearchItem, SearchResponse};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::path::PathBuf;
use std::sync::Arc;

/// Bumped whenever the `Provider`/`ProviderApi` contract changes shape.
/// Bundles declaring another version are refused at load time.
pub const PROVIDER_API_VERSION: u32 = 1;

/// Host services handed to provider code
#[derive(Debug, Clone)]
pub struct ProviderContext {
    pub provider_id: String,
    /// Shared HTTP client; providers should not build their own
    pub http: reqwest::Client,
    /// Private writable directory for the provider
    pub data_dir: PathBuf,
}

/// Object instantiated from a provider bundle's entry point
pub trait Provider: Send + Sync {
    /// Build the API object used to search and resolve links
    fn create_api(&self, ctx: &ProviderContext) -> anyhow::Result<Arc<dyn ProviderApi>>;

    /// Release whatever the provider holds before its bundle is removed
    fn on_unload(&self, _ctx: &ProviderContext) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait]
pub trait ProviderApi: Send + Sync {
    /// Search the provider's own catalog
    async fn search(&self, query: &str, page: u32) -> anyhow::Result<SearchResponse>;

    /// Provider-side details (including episodes) for a search hit
    async fn get_metadata(&self, item: &SearchItem) -> anyhow::Result<FilmDetails>;

    /// Produce streams and subtitles as they are discovered.
    ///
    /// The stream ending means the provider is done; an `Err` item reports a
    /// failure and nothing after it is consumed.
    fn get_links<'a>(
        &'a self,
        watch_id: &'a str,
        film: &'a FilmDetails,
        episode: Option<&'a Episode>,
    ) -> BoxStream<'a, anyhow::Result<MediaLink>>;

    /// Artwork shown next to the provider's results
    fn thumbnail(&self) -> Option<String> {
        None
    }
}
