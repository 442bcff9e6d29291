use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::shared::errors::AppResult;

/// User-facing state persisted for one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderPreference {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub is_disabled: bool,
}

impl ProviderPreference {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_disabled: false,
        }
    }
}

/// Repository interface for persisted provider ordering and enablement.
/// The stored order is the user's preference order; index 0 is tried first.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProviderPreferences: Send + Sync {
    /// Read the persisted preference list
    async fn load(&self) -> AppResult<Vec<ProviderPreference>>;

    /// Replace the persisted preference list
    async fn save(&self, preferences: &[ProviderPreference]) -> AppResult<()>;
}
