pub mod loader;
pub mod registry;
pub mod storage;

pub use loader::{LoadResult, LoadedProvider, PluginLoader};
pub use registry::{ProviderApiHandle, ProviderApiRegistry, ProviderRegistry};
pub use storage::{FsBundleStorage, InMemoryPreferences, JsonFilePreferences};
