use crate::modules::provider::domain::EpisodeKey;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one resolution result
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub film_id: String,
    pub provider_id: String,
    pub episode: Option<EpisodeKey>,
}

impl CacheKey {
    pub fn new(
        film_id: impl Into<String>,
        provider_id: impl Into<String>,
        episode: Option<EpisodeKey>,
    ) -> Self {
        Self {
            film_id: film_id.into(),
            provider_id: provider_id.into(),
            episode,
        }
    }

    /// Same film and provider, without the episode
    pub fn film_only(&self) -> CacheKey {
        CacheKey {
            film_id: self.film_id.clone(),
            provider_id: self.provider_id.clone(),
            episode: None,
        }
    }

    pub fn is_film_only(&self) -> bool {
        self.episode.is_none()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.episode {
            Some(ep) => write!(
                f,
                "{}@{}:S{}E{}",
                self.film_id, self.provider_id, ep.season, ep.number
            ),
            None => write!(f, "{}@{}", self.film_id, self.provider_id),
        }
    }
}

/// The second slot every write to `key` also lands in.
///
/// A film-only key is its own alias.
pub fn alias_of(key: &CacheKey) -> CacheKey {
    key.film_only()
}
