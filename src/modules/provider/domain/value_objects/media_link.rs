use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Extra facts attached to a stream
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Flag {
    /// Stream stops working at this Unix time (seconds)
    Expires(i64),
    /// Provider vouches for the stream under this label
    Trusted(String),
    /// Playback needs this request header
    RequiresAuth { header: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Stream {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub flags: BTreeSet<Flag>,
}

impl Stream {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            flags: BTreeSet::new(),
        }
    }

    pub fn with_flag(mut self, flag: Flag) -> Self {
        self.flags.insert(flag);
        self
    }

    /// Earliest expiry carried by the stream, if any
    pub fn expires_at(&self) -> Option<i64> {
        self.flags
            .iter()
            .filter_map(|f| match f {
                Flag::Expires(t) => Some(*t),
                _ => None,
            })
            .min()
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at().map(|t| t < now).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Subtitle {
    pub language: String,
    pub url: String,
}

impl Subtitle {
    pub fn new(language: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            url: url.into(),
        }
    }

    pub fn same_url(&self, other: &Subtitle) -> bool {
        self.url.eq_ignore_ascii_case(&other.url)
    }
}

/// One item produced incrementally by a provider while extracting links
#[derive(Debug, Clone, PartialEq)]
pub enum MediaLink {
    Stream(Stream),
    Subtitle(Subtitle),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_uses_earliest_flag() {
        let stream = Stream::new("auto", "http://x/1")
            .with_flag(Flag::Expires(50))
            .with_flag(Flag::Expires(20));
        assert_eq!(stream.expires_at(), Some(20));
        assert!(stream.is_expired(21));
        assert!(!stream.is_expired(20));
    }

    #[test]
    fn streams_without_expiry_never_expire() {
        let stream = Stream::new("auto", "http://x/1").with_flag(Flag::Trusted("cdn".into()));
        assert!(!stream.is_expired(i64::MAX));
    }

    #[test]
    fn subtitle_urls_compare_case_insensitively() {
        let a = Subtitle::new("en", "HTTP://Subs/EN.vtt");
        let b = Subtitle::new("English", "http://subs/en.vtt");
        assert!(a.same_url(&b));
    }
}
