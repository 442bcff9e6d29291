mod bundle_storage;
mod preferences_repo;

pub use bundle_storage::*;
pub use preferences_repo::*;
