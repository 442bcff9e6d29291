// Shared kernel: errors, configuration and small utilities used by every module

pub mod config;
pub mod errors;
pub mod utils;

// Re-exports for convenience
pub use config::RuntimeConfig;
pub use errors::{AppError, AppResult};
