use log::{debug, error, info, warn};
use std::sync::Once;
use std::time::{Duration, Instant};

/// Environment variable holding an `env_logger` filter, e.g. `reelhost=trace`
pub const LOG_FILTER_ENV: &str = "REELHOST_LOG";

static INIT: Once = Once::new();

/// Install the global logger once.
///
/// Plugin and resolution events log at debug under `reelhost`; HTTP and runtime
/// internals only surface warnings. `REELHOST_LOG` overrides both.
pub fn init_logger() {
    INIT.call_once(|| {
        let mut builder = env_logger::Builder::new();
        builder
            .filter_level(log::LevelFilter::Info)
            .filter_module("reelhost", log::LevelFilter::Debug)
            .filter_module("reqwest", log::LevelFilter::Warn)
            .filter_module("hyper", log::LevelFilter::Warn)
            .filter_module("tokio", log::LevelFilter::Warn)
            .format_timestamp_secs()
            .format_target(false);
        if let Ok(filter) = std::env::var(LOG_FILTER_ENV) {
            builder.parse_filters(&filter);
        }

        // A host application may already own the global logger
        if builder.try_init().is_ok() {
            info!("Provider host logging ready");
        }
    });
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        log::info!($($arg)*)
    };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        log::debug!($($arg)*)
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        log::warn!($($arg)*)
    };
}

/// One-line log records for plugin lifecycle and link resolution
pub struct LogContext;

impl LogContext {
    pub fn plugin_load(provider_id: &str, version: &str, error: Option<&dyn std::error::Error>) {
        match error {
            None => info!("Plugin: loaded {} ({})", provider_id, version),
            Some(e) => error!("Plugin: failed to load {} ({}): {}", provider_id, version, e),
        }
    }

    pub fn plugin_unload(provider_id: &str, step: &str) {
        debug!("Plugin: unloading {}, {}", provider_id, step);
    }

    pub fn download_progress(provider_id: &str, bytes: u64, percent: Option<u8>) {
        match percent {
            Some(p) => debug!("Download: {} {}% ({} bytes)", provider_id, p, bytes),
            None => debug!("Download: {} {} bytes", provider_id, bytes),
        }
    }

    /// A single provider failing while others may still be tried
    pub fn resolution_failure(provider_id: &str, film: &str, error: &dyn std::error::Error) {
        warn!("Resolve: provider {} failed for '{}': {}", provider_id, film, error);
    }

    pub fn resolution_outcome(film: &str, provider_id: &str, streams: usize) {
        info!("Resolve: '{}' via {} produced {} streams", film, provider_id, streams);
    }

    pub fn error_with_context(error: &dyn std::error::Error, context: &str) {
        error!("{}: {}", context, error);
    }
}

/// Wall-clock timer for a plugin operation, logged when finished
pub struct TimedOperation {
    start: Instant,
    operation: String,
}

impl TimedOperation {
    pub fn new(operation: impl Into<String>) -> Self {
        let operation = operation.into();
        debug!("Starting: {}", operation);
        Self {
            start: Instant::now(),
            operation,
        }
    }

    pub fn finish(self) -> Duration {
        let elapsed = self.start.elapsed();
        info!("Timing: {} took {}ms", self.operation, elapsed.as_millis());
        elapsed
    }
}
