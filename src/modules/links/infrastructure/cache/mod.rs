mod cached_links_store;

pub use cached_links_store::{CacheSnapshot, CacheStats, CachedLinksStore};
