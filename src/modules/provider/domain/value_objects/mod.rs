pub mod film;
pub mod media_link;
pub mod provider_metadata;

pub use film::*;
pub use media_link::*;
pub use provider_metadata::*;
