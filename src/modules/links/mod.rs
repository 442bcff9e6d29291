pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::{LinkOrchestrator, LinkRequest, ResolutionHandle};
pub use domain::{alias_of, CacheKey, CachedLinks, MediaLinkResourceState, ProviderFailure};
pub use infrastructure::CachedLinksStore;
