pub mod bundle_fetcher;
pub mod dylib;
pub mod module_handle;
pub mod plugin_loader;

pub use bundle_fetcher::{BundleFetcher, DownloadProgress, HttpBundleFetcher, ProgressCallback};
pub use dylib::{DylibModuleLoader, ProviderBox, MANIFEST_SYMBOL};
pub use module_handle::{BundleManifest, EntryPoint, LoadedProvider, ModuleHandle, ModuleLoader};
pub use plugin_loader::{LoadResult, PluginLoader, METADATA_SIDECAR_EXTENSION, UPDATER_SIDECAR};
