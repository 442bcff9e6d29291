pub mod cache;

pub use cache::{CacheStats, CachedLinksStore};
