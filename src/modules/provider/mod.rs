pub mod domain;
pub mod infrastructure;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use domain::{FilmDetails, FilmType, MediaLink, ProviderMetadata, Stream, Subtitle};
pub use infrastructure::{
    LoadResult, LoadedProvider, PluginLoader, ProviderApiHandle, ProviderApiRegistry,
    ProviderRegistry,
};
pub use traits::{Provider, ProviderApi, ProviderContext, PROVIDER_API_VERSION};
