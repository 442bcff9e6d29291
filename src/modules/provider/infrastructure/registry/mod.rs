mod api_registry;
mod provider_registry;

pub use api_registry::{
    ApiRegistryEvent, ApiSnapshot, ProviderApiHandle, ProviderApiRegistry, ProviderContextFactory,
};
pub use provider_registry::ProviderRegistry;
