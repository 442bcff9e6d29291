use super::film::FilmType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Kind of titles a provider can resolve
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    Movie,
    TvShow,
    #[default]
    All,
}

impl ProviderType {
    pub fn supports(&self, film_type: FilmType) -> bool {
        match self {
            ProviderType::All => true,
            ProviderType::Movie => film_type == FilmType::Movie,
            ProviderType::TvShow => film_type == FilmType::TvShow,
        }
    }
}

/// Maintainer-reported health of a provider
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    #[default]
    Working,
    Maintenance,
    Down,
}

impl ProviderStatus {
    /// Down providers are never tried automatically
    pub fn is_usable(&self) -> bool {
        !matches!(self, ProviderStatus::Down)
    }
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderStatus::Working => "working",
            ProviderStatus::Maintenance => "maintenance",
            ProviderStatus::Down => "down",
        };
        write!(f, "{}", name)
    }
}

/// Where a provider bundle comes from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceDescriptor {
    Local { path: PathBuf },
    Remote { url: String },
}

/// Description of a provider, independent of whether its code is loaded.
///
/// Immutable: a new version replaces the whole value instead of mutating it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ProviderMetadata {
    pub id: String,
    pub name: String,
    pub version_name: String,
    pub version_code: i64,
    #[serde(default)]
    pub provider_type: ProviderType,
    #[serde(default)]
    pub status: ProviderStatus,
    pub source: SourceDescriptor,
    /// Repository the bundle was published in, used as the bundle's directory name
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ProviderMetadata {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        version_name: impl Into<String>,
        version_code: i64,
        source: SourceDescriptor,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version_name: version_name.into(),
            version_code,
            provider_type: ProviderType::default(),
            status: ProviderStatus::default(),
            source,
            repository: None,
            description: None,
        }
    }

    pub fn with_type(mut self, provider_type: ProviderType) -> Self {
        self.provider_type = provider_type;
        self
    }

    pub fn with_status(mut self, status: ProviderStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = Some(repository.into());
        self
    }

    pub fn is_newer_than(&self, other: &ProviderMetadata) -> bool {
        self.id == other.id && self.version_code > other.version_code
    }

    /// File name of the bundle on disk: `<sanitised id>-v<version code>.<platform library extension>`
    pub fn bundle_file_name(&self) -> String {
        format!(
            "{}-v{}.{}",
            sanitize_path_segment(&self.id),
            self.version_code,
            std::env::consts::DLL_EXTENSION
        )
    }

    /// Directory name grouping bundles from the same repository
    pub fn repository_dir_name(&self) -> String {
        self.repository
            .as_deref()
            .map(sanitize_path_segment)
            .unwrap_or_else(|| "local".to_string())
    }
}

/// Keep ids usable as single path segments on every platform
pub fn sanitize_path_segment(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_matches('.').to_string();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(id: &str, version_code: i64) -> ProviderMetadata {
        ProviderMetadata::new(
            id,
            "Test",
            "1.0.0",
            version_code,
            SourceDescriptor::Remote {
                url: "https://example.org/p.so".into(),
            },
        )
    }

    #[test]
    fn provider_type_support_matrix() {
        assert!(ProviderType::All.supports(FilmType::Movie));
        assert!(ProviderType::All.supports(FilmType::TvShow));
        assert!(ProviderType::Movie.supports(FilmType::Movie));
        assert!(!ProviderType::Movie.supports(FilmType::TvShow));
        assert!(!ProviderType::TvShow.supports(FilmType::Movie));
    }

    #[test]
    fn newer_version_requires_same_id() {
        assert!(metadata("a", 2).is_newer_than(&metadata("a", 1)));
        assert!(!metadata("a", 1).is_newer_than(&metadata("a", 1)));
        assert!(!metadata("b", 5).is_newer_than(&metadata("a", 1)));
    }

    #[test]
    fn bundle_names_cannot_escape_their_directory() {
        let name = metadata("../../etc/passwd", 1).bundle_file_name();
        assert!(!name.contains('/'));
        assert!(!name.starts_with('.'));
        assert_eq!(sanitize_path_segment("   "), "_");
        assert_eq!(metadata("x", 1).repository_dir_name(), "local");
    }

    #[test]
    fn each_version_has_its_own_bundle_file() {
        let ext = std::env::consts::DLL_EXTENSION;
        assert_eq!(metadata("p1", 3).bundle_file_name(), format!("p1-v3.{}", ext));
        assert_ne!(
            metadata("p1", 1).bundle_file_name(),
            metadata("p1", 2).bundle_file_name()
        );
    }

    #[test]
    fn metadata_round_trips_through_json_with_defaults() {
        let json = r#"{
            "id": "p1",
            "name": "Provider One",
            "version_name": "1.2.0",
            "version_code": 12,
            "source": { "kind": "remote", "url": "https://example.org/p1.so" }
        }"#;
        let parsed: ProviderMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.provider_type, ProviderType::All);
        assert_eq!(parsed.status, ProviderStatus::Working);
        assert!(parsed.repository.is_none());
    }
}
