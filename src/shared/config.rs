use crate::log_debug;
use crate::shared::errors::{AppError, AppResult};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_PLUGINS_DIR: &str = "REELHOST_PLUGINS_DIR";
pub const ENV_PREFERENCES_FILE: &str = "REELHOST_PREFERENCES_FILE";
pub const ENV_HTTP_TIMEOUT_SECS: &str = "REELHOST_HTTP_TIMEOUT_SECS";
pub const ENV_USER_AGENT: &str = "REELHOST_USER_AGENT";
pub const ENV_MAX_PROVIDER_ATTEMPTS: &str = "REELHOST_MAX_PROVIDER_ATTEMPTS";

/// Runtime configuration for the provider host
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// Root directory holding downloaded provider bundles
    pub plugins_dir: PathBuf,
    /// JSON file persisting provider order and enablement
    pub preferences_file: PathBuf,
    /// Timeout applied to bundle downloads and to the client handed to providers
    pub http_timeout: Duration,
    pub user_agent: String,
    /// Upper bound on providers tried by one automatic resolution (0 = no limit)
    pub max_provider_attempts: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let plugins_dir = PathBuf::from("plugins");
        Self {
            preferences_file: plugins_dir.join("providers.json"),
            plugins_dir,
            http_timeout: Duration::from_secs(30),
            user_agent: format!("reelhost/{}", env!("CARGO_PKG_VERSION")),
            max_provider_attempts: 0,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from the process environment (and a `.env` file if present)
    pub fn from_env() -> AppResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let plugins_dir = lookup(ENV_PLUGINS_DIR)
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.plugins_dir);

        let preferences_file = lookup(ENV_PREFERENCES_FILE)
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| plugins_dir.join("providers.json"));

        let http_timeout = match lookup(ENV_HTTP_TIMEOUT_SECS) {
            Some(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|e| {
                    AppError::InvalidInput(format!("{}={:?}: {}", ENV_HTTP_TIMEOUT_SECS, raw, e))
                })?;
                if secs == 0 {
                    return Err(AppError::InvalidInput(format!(
                        "{} must be greater than zero",
                        ENV_HTTP_TIMEOUT_SECS
                    )));
                }
                Duration::from_secs(secs)
            }
            None => defaults.http_timeout,
        };

        let max_provider_attempts = match lookup(ENV_MAX_PROVIDER_ATTEMPTS) {
            Some(raw) => raw.trim().parse().map_err(|e| {
                AppError::InvalidInput(format!("{}={:?}: {}", ENV_MAX_PROVIDER_ATTEMPTS, raw, e))
            })?,
            None => defaults.max_provider_attempts,
        };

        let config = Self {
            plugins_dir,
            preferences_file,
            http_timeout,
            user_agent: lookup(ENV_USER_AGENT).unwrap_or(defaults.user_agent),
            max_provider_attempts,
        };

        log_debug!("Runtime configuration: {:?}", config);
        Ok(config)
    }

    /// HTTP client shared by the bundle fetcher and handed to providers
    pub fn http_client(&self) -> AppResult<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.http_timeout)
            .user_agent(self.user_agent.clone())
            .build()
            .map_err(|e| AppError::InternalError(format!("Failed to build HTTP client: {}", e)))
    }
}
