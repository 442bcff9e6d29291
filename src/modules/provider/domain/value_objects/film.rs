use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FilmType {
    Movie,
    TvShow,
}

/// Season/episode coordinates of a TV episode
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EpisodeKey {
    pub season: u32,
    pub number: u32,
}

impl EpisodeKey {
    pub fn new(season: u32, number: u32) -> Self {
        Self { season, number }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Episode {
    /// Provider-side episode id, when known
    #[serde(default)]
    pub id: Option<String>,
    pub season: u32,
    pub number: u32,
    #[serde(default)]
    pub title: Option<String>,
}

impl Episode {
    pub fn new(season: u32, number: u32) -> Self {
        Self {
            id: None,
            season,
            number,
            title: None,
        }
    }

    pub fn key(&self) -> EpisodeKey {
        EpisodeKey::new(self.season, self.number)
    }
}

/// Full description of a title, either from the catalog or from a provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilmDetails {
    /// Catalog id for catalog films, provider-side id for provider results
    pub id: String,
    pub title: String,
    pub film_type: FilmType,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub poster: Option<String>,
    /// Episodes known for TV shows, flattened across seasons
    #[serde(default)]
    pub episodes: Vec<Episode>,
    /// Provider that produced these details; `id` is then that provider's watch id
    #[serde(default)]
    pub provider_id: Option<String>,
}

impl FilmDetails {
    pub fn movie(id: impl Into<String>, title: impl Into<String>, year: Option<i32>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            film_type: FilmType::Movie,
            year,
            poster: None,
            episodes: Vec::new(),
            provider_id: None,
        }
    }

    pub fn tv_show(id: impl Into<String>, title: impl Into<String>, year: Option<i32>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            film_type: FilmType::TvShow,
            year,
            poster: None,
            episodes: Vec::new(),
            provider_id: None,
        }
    }

    pub fn with_episodes(mut self, episodes: Vec<Episode>) -> Self {
        self.episodes = episodes;
        self
    }

    pub fn from_provider(mut self, provider_id: impl Into<String>) -> Self {
        self.provider_id = Some(provider_id.into());
        self
    }

    /// Watch id usable directly against `provider_id`, when these details came from it
    pub fn watch_id_for(&self, provider_id: &str) -> Option<&str> {
        (self.provider_id.as_deref() == Some(provider_id)).then_some(self.id.as_str())
    }

    pub fn find_episode(&self, key: EpisodeKey) -> Option<&Episode> {
        self.episodes.iter().find(|e| e.key() == key)
    }
}

/// One search hit returned by a provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchItem {
    pub id: String,
    pub title: String,
    pub film_type: FilmType,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub poster: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SearchResponse {
    pub page: u32,
    pub results: Vec<SearchItem>,
    pub has_next_page: bool,
}
