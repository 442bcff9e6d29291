use crate::modules::provider::domain::Stream;
use crate::shared::errors::AppError;
use serde::Serialize;

/// A provider that failed during one resolution run
#[derive(Debug, Clone, Serialize)]
pub struct ProviderFailure {
    pub provider_id: String,
    pub error: AppError,
}

impl ProviderFailure {
    pub fn new(provider_id: impl Into<String>, error: AppError) -> Self {
        Self {
            provider_id: provider_id.into(),
            error,
        }
    }

    pub fn is_no_usable_streams(&self) -> bool {
        matches!(self.error, AppError::NoUsableStreams { .. })
    }
}

/// Progress of a link resolution, as seen by whoever started it
#[derive(Debug, Clone, Default, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MediaLinkResourceState {
    #[default]
    Idle,
    /// Looking up the provider-side id of the title
    Fetching { provider_id: String },
    /// Pulling links out of the provider
    Extracting { provider_id: String },
    /// Usable streams found so far for the current provider
    PartialResult {
        provider_id: String,
        streams: Vec<Stream>,
    },
    /// `failures` lists providers tried before `provider_id` succeeded
    Success {
        provider_id: String,
        failures: Vec<ProviderFailure>,
    },
    Unavailable {
        provider_id: Option<String>,
        reason: String,
        failures: Vec<ProviderFailure>,
    },
    Error { failures: Vec<ProviderFailure> },
}

impl MediaLinkResourceState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MediaLinkResourceState::Success { .. }
                | MediaLinkResourceState::Unavailable { .. }
                | MediaLinkResourceState::Error { .. }
        )
    }

    pub fn is_loading(&self) -> bool {
        matches!(
            self,
            MediaLinkResourceState::Fetching { .. }
                | MediaLinkResourceState::Extracting { .. }
                | MediaLinkResourceState::PartialResult { .. }
        )
    }

    /// Provider the state refers to, when there is exactly one
    pub fn provider_id(&self) -> Option<&str> {
        match self {
            MediaLinkResourceState::Fetching { provider_id }
            | MediaLinkResourceState::Extracting { provider_id }
            | MediaLinkResourceState::PartialResult { provider_id, .. }
            | MediaLinkResourceState::Success { provider_id, .. } => Some(provider_id),
            MediaLinkResourceState::Unavailable { provider_id, .. } => provider_id.as_deref(),
            MediaLinkResourceState::Idle | MediaLinkResourceState::Error { .. } => None,
        }
    }
}
