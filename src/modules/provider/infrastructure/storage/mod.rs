mod fs_bundle_storage;
mod preferences_store;

pub use fs_bundle_storage::FsBundleStorage;
pub use preferences_store::{InMemoryPreferences, JsonFilePreferences};
