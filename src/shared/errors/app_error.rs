use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, Serialize)]
#[serde(tag = "type", content = "message")]
pub enum AppError {
    #[error("Download failure: {0}")]
    DownloadFailure(String),

    #[error("Load failure: {0}")]
    LoadFailure(String),

    #[error("Provider not loaded: {0}")]
    ProviderNotLoaded(String),

    #[error("Provider {provider_id} failed: {message}")]
    ResolutionFailure {
        provider_id: String,
        message: String,
    },

    #[error("Provider {provider_id} returned no usable streams")]
    NoUsableStreams { provider_id: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl AppError {
    /// Whether the caller may retry the same operation without changing its inputs
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::DownloadFailure(_) | AppError::ExternalServiceError(_)
        )
    }

    pub fn resolution(provider_id: impl Into<String>, err: &anyhow::Error) -> Self {
        AppError::ResolutionFailure {
            provider_id: provider_id.into(),
            message: format!("{:#}", err),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => AppError::NotFound(err.to_string()),
            _ => AppError::IoError(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::DownloadFailure("Request timeout".to_string())
        } else if err.is_connect() {
            AppError::DownloadFailure("Failed to connect to remote host".to_string())
        } else if let Some(status) = err.status() {
            match status.as_u16() {
                404 => AppError::DownloadFailure("Remote bundle not found".to_string()),
                _ => AppError::DownloadFailure(format!("HTTP {}: {}", status, err)),
            }
        } else {
            AppError::DownloadFailure(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::SerializationError(err.to_string())
    }
}

impl From<libloading::Error> for AppError {
    fn from(err: libloading::Error) -> Self {
        AppError::LoadFailure(err.to_string())
    }
}

impl From<std::num::ParseIntError> for AppError {
    fn from(err: std::num::ParseIntError) -> Self {
        AppError::InvalidInput(format!("Invalid number: {}", err))
    }
}

// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
