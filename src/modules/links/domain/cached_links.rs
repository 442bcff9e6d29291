use crate::modules::provider::domain::{Stream, Subtitle};
use serde::{Deserialize, Serialize};

/// Streams and subtitles resolved for one cache key.
///
/// Values are replaced whole; the `with_*` methods return a new value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CachedLinks {
    /// Provider-side id of the title the links were resolved from
    pub watch_id: String,
    pub provider_id: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub streams: Vec<Stream>,
    #[serde(default)]
    pub subtitles: Vec<Subtitle>,
}

impl CachedLinks {
    pub fn new(watch_id: impl Into<String>, provider_id: impl Into<String>) -> Self {
        Self {
            watch_id: watch_id.into(),
            provider_id: provider_id.into(),
            ..Self::default()
        }
    }

    pub fn with_thumbnail(mut self, thumbnail: Option<String>) -> Self {
        self.thumbnail = thumbnail;
        self
    }

    /// Append `stream` unless one with the same URL is already present
    pub fn with_stream(&self, stream: Stream) -> Option<CachedLinks> {
        if self.streams.iter().any(|s| s.url == stream.url) {
            return None;
        }
        let mut next = self.clone();
        next.streams.push(stream);
        Some(next)
    }

    /// Append `subtitle` unless its URL is already present, ignoring case
    pub fn with_subtitle(&self, subtitle: Subtitle) -> Option<CachedLinks> {
        if self.subtitles.iter().any(|s| s.same_url(&subtitle)) {
            return None;
        }
        let mut next = self.clone();
        next.subtitles.push(subtitle);
        Some(next)
    }

    /// Copy without the streams that expired before `now`
    pub fn filtered(&self, now: i64) -> CachedLinks {
        CachedLinks {
            streams: self
                .streams
                .iter()
                .filter(|s| !s.is_expired(now))
                .cloned()
                .collect(),
            ..self.clone()
        }
    }

    pub fn has_usable_streams(&self, now: i64) -> bool {
        self.streams.iter().any(|s| !s.is_expired(now))
    }
}
