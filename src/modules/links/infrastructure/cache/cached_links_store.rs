use crate::modules::links::domain::{alias_of, CacheKey, CachedLinks};
use crate::modules::provider::domain::{Stream, Subtitle};
use crate::shared::utils::Clock;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

pub type CacheSnapshot = Arc<HashMap<CacheKey, CachedLinks>>;

/// Cache statistics for diagnostics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries_count: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }
}

/// Resolved links keyed by film, provider and episode.
///
/// The whole map is one published value. A write clones it only while some
/// reader still holds the previous snapshot, so readers never see a half-applied
/// change. Expired streams are dropped when read, never swept.
pub struct CachedLinksStore {
    entries: watch::Sender<CacheSnapshot>,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CachedLinksStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let (entries, _) = watch::channel(Arc::new(HashMap::new()));
        Self {
            entries,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Replace the value of `key` and of its alias
    pub fn store_cache(&self, key: &CacheKey, value: CachedLinks) {
        self.entries.send_modify(|map| {
            write_with_alias(Arc::make_mut(map), key, value);
        });
        debug!("Cache: stored {}", key);
    }

    /// Append a stream; no-op when `key` was never initialised or the URL is known
    pub fn add_stream(&self, key: &CacheKey, stream: Stream) -> bool {
        self.update(key, |current| current.with_stream(stream))
    }

    /// Append a subtitle; no-op when `key` was never initialised or the URL is known
    pub fn add_subtitle(&self, key: &CacheKey, subtitle: Subtitle) -> bool {
        self.update(key, |current| current.with_subtitle(subtitle))
    }

    /// Forget `key` and its alias
    pub fn remove_cache(&self, key: &CacheKey) {
        let alias = alias_of(key);
        let removed = self.entries.send_if_modified(|map| {
            if !map.contains_key(key) && !map.contains_key(&alias) {
                return false;
            }
            let map = Arc::make_mut(map);
            map.remove(key);
            map.remove(&alias);
            true
        });

        if removed {
            debug!("Cache: removed {} and {}", key, alias);
        }
    }

    /// Entry for `key` without its expired streams.
    ///
    /// `None` unless at least one usable stream remains; subtitles alone are not a hit.
    pub fn get_cache(&self, key: &CacheKey) -> Option<CachedLinks> {
        let now = self.clock.now_epoch_secs();
        let found = self
            .entries
            .borrow()
            .get(key)
            .map(|links| links.filtered(now))
            .filter(|links| !links.streams.is_empty());

        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    /// Non-expired streams of `key`, in arrival order; does not count as a lookup
    pub fn usable_streams(&self, key: &CacheKey) -> Vec<Stream> {
        let now = self.clock.now_epoch_secs();
        self.entries
            .borrow()
            .get(key)
            .map(|links| {
                links
                    .streams
                    .iter()
                    .filter(|s| !s.is_expired(now))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Stored value for `key` as is, expired streams included
    pub fn peek(&self, key: &CacheKey) -> Option<CachedLinks> {
        self.entries.borrow().get(key).cloned()
    }

    /// Current value of `key` followed by every change to it.
    ///
    /// An absent key is initialised with `default` first, so the stream always
    /// opens with a value. Emissions are filtered for expiry and consecutive
    /// duplicates are dropped.
    pub fn observe_cache(
        &self,
        key: &CacheKey,
        default: CachedLinks,
    ) -> BoxStream<'static, Option<CachedLinks>> {
        let created = self.entries.send_if_modified(|map| {
            if map.contains_key(key) {
                return false;
            }
            let alias = alias_of(key);
            let map = Arc::make_mut(map);
            // Lazy creation never overwrites context already held by the alias
            if !map.contains_key(&alias) {
                map.insert(alias, default.clone());
            }
            map.insert(key.clone(), default);
            true
        });
        if created {
            debug!("Cache: created empty entry for observed key {}", key);
        }

        let state = ObserveState {
            receiver: self.entries.subscribe(),
            key: key.clone(),
            clock: Arc::clone(&self.clock),
            last: None,
        };

        stream::unfold(state, |mut state| async move {
            loop {
                if state.last.is_some() && state.receiver.changed().await.is_err() {
                    return None;
                }

                let now = state.clock.now_epoch_secs();
                let current = state
                    .receiver
                    .borrow_and_update()
                    .get(&state.key)
                    .map(|links| links.filtered(now));

                if state.last.as_ref() == Some(&current) {
                    continue;
                }
                state.last = Some(current.clone());
                return Some((current, state));
            }
        })
        .boxed()
    }

    pub fn clear(&self) {
        let cleared = self.entries.send_if_modified(|map| {
            if map.is_empty() {
                return false;
            }
            *map = Arc::new(HashMap::new());
            true
        });
        if cleared {
            debug!("Cache: cleared");
        }
    }

    /// Number of occupied slots, aliases included
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Whole map as one consistent value
    pub fn snapshot(&self) -> CacheSnapshot {
        Arc::clone(&self.entries.borrow())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries_count: self.len(),
        }
    }

    fn update<F>(&self, key: &CacheKey, apply: F) -> bool
    where
        F: FnOnce(&CachedLinks) -> Option<CachedLinks>,
    {
        self.entries.send_if_modified(|map| {
            let Some(next) = map.get(key).and_then(apply) else {
                return false;
            };
            write_with_alias(Arc::make_mut(map), key, next);
            true
        })
    }
}

struct ObserveState {
    receiver: watch::Receiver<CacheSnapshot>,
    key: CacheKey,
    clock: Arc<dyn Clock>,
    /// Last emitted value; `None` before the first emission
    last: Option<Option<CachedLinks>>,
}

/// The alias slot takes whatever was written last, across all episodes
fn write_with_alias(map: &mut HashMap<CacheKey, CachedLinks>, key: &CacheKey, value: CachedLinks) {
    let alias = alias_of(key);
    if alias != *key {
        map.insert(alias, value.clone());
    }
    map.insert(key.clone(), value);
}
