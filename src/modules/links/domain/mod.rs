pub mod cache_key;
pub mod cached_links;
pub mod resolution_state;
pub mod title_match;

pub use cache_key::{alias_of, CacheKey};
pub use cached_links::CachedLinks;
pub use resolution_state::{MediaLinkResourceState, ProviderFailure};
pub use title_match::{best_match, normalize_title};
