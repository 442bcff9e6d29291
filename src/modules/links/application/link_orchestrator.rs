use crate::modules::links::domain::{
    alias_of, best_match, CacheKey, CachedLinks, MediaLinkResourceState, ProviderFailure,
};
use crate::modules::links::infrastructure::CachedLinksStore;
use crate::modules::provider::domain::{Episode, EpisodeKey, FilmDetails, MediaLink, SearchItem};
use crate::modules::provider::infrastructure::registry::{
    ProviderApiHandle, ProviderApiRegistry, ProviderRegistry,
};
use crate::shared::config::RuntimeConfig;
use crate::shared::errors::AppError;
use crate::shared::utils::logger::LogContext;
use crate::{log_debug, log_info};
use dashmap::DashMap;
use futures::channel::mpsc;
use futures::stream::{BoxStream, Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

type RunKey = (String, Option<EpisodeKey>);

/// What to resolve, and optionally with which provider
#[derive(Debug, Clone)]
pub struct LinkRequest {
    pub film: FilmDetails,
    pub episode: Option<Episode>,
    /// Manual mode when set; otherwise providers are tried in registry order
    pub provider_id: Option<String>,
}

impl LinkRequest {
    pub fn new(film: FilmDetails) -> Self {
        Self {
            film,
            episode: None,
            provider_id: None,
        }
    }

    pub fn with_episode(mut self, episode: Episode) -> Self {
        self.episode = Some(episode);
        self
    }

    pub fn with_provider(mut self, provider_id: impl Into<String>) -> Self {
        self.provider_id = Some(provider_id.into());
        self
    }

    pub fn cache_key(&self, provider_id: &str) -> CacheKey {
        CacheKey::new(
            &self.film.id,
            provider_id,
            self.episode.as_ref().map(Episode::key),
        )
    }

    fn run_key(&self) -> RunKey {
        (self.film.id.clone(), self.episode.as_ref().map(Episode::key))
    }
}

/// States of one resolution run; ends after a terminal state or on cancellation.
///
/// Dropping the handle does not stop the run, [`ResolutionHandle::cancel`] does.
pub struct ResolutionHandle {
    id: Uuid,
    states: BoxStream<'static, MediaLinkResourceState>,
    token: CancellationToken,
}

impl ResolutionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Drain the remaining states and return the last one
    pub async fn last_state(mut self) -> Option<MediaLinkResourceState> {
        let mut last = None;
        while let Some(state) = self.states.next().await {
            last = Some(state);
        }
        last
    }
}

impl Stream for ResolutionHandle {
    type Item = MediaLinkResourceState;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.states.poll_next_unpin(cx)
    }
}

/// Drives provider APIs to fill the links cache for a film or episode
#[derive(Clone)]
pub struct LinkOrchestrator {
    providers: Arc<ProviderRegistry>,
    apis: Arc<ProviderApiRegistry>,
    cache: Arc<CachedLinksStore>,
    max_provider_attempts: usize,
    in_flight: Arc<DashMap<RunKey, (Uuid, CancellationToken)>>,
}

type Emitter = mpsc::UnboundedSender<MediaLinkResourceState>;

impl LinkOrchestrator {
    pub fn new(
        providers: Arc<ProviderRegistry>,
        apis: Arc<ProviderApiRegistry>,
        cache: Arc<CachedLinksStore>,
        config: &RuntimeConfig,
    ) -> Self {
        Self {
            providers,
            apis,
            cache,
            max_provider_attempts: config.max_provider_attempts,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    pub fn cache(&self) -> &Arc<CachedLinksStore> {
        &self.cache
    }

    /// Start resolving `request`.
    ///
    /// A run still going for the same film and episode is cancelled first.
    pub fn resolve(&self, request: LinkRequest) -> ResolutionHandle {
        let id = Uuid::new_v4();
        let token = CancellationToken::new();
        let run_key = request.run_key();

        if let Some((previous, previous_token)) =
            self.in_flight.insert(run_key.clone(), (id, token.clone()))
        {
            log_debug!("Resolve: run {} superseded by {}", previous, id);
            previous_token.cancel();
        }

        let (tx, rx) = mpsc::unbounded();
        let orchestrator = self.clone();
        let run_token = token.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = run_token.cancelled() => {
                    log_debug!("Resolve: run {} for '{}' cancelled", id, request.film.title);
                }
                _ = orchestrator.run(&request, &tx) => {}
            }
            orchestrator
                .in_flight
                .remove_if(&run_key, |_, (current, _)| *current == id);
        });

        ResolutionHandle {
            id,
            states: rx.boxed(),
            token,
        }
    }

    /// Cancel whatever run is going for `film_id` and `episode`
    pub fn cancel(&self, film_id: &str, episode: Option<EpisodeKey>) -> bool {
        match self.in_flight.remove(&(film_id.to_string(), episode)) {
            Some((_, (_, token))) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    async fn run(&self, request: &LinkRequest, tx: &Emitter) {
        let terminal = match &request.provider_id {
            Some(provider_id) => self.run_manual(request, provider_id, tx).await,
            None => self.run_automatic(request, tx).await,
        };
        let _ = tx.unbounded_send(terminal);
    }

    async fn run_manual(
        &self,
        request: &LinkRequest,
        provider_id: &str,
        tx: &Emitter,
    ) -> MediaLinkResourceState {
        let Some(api) = self.apis.get_api(provider_id) else {
            return MediaLinkResourceState::Error {
                failures: vec![ProviderFailure::new(
                    provider_id,
                    AppError::ProviderNotLoaded(provider_id.to_string()),
                )],
            };
        };

        match self.resolve_with(&api, request, tx).await {
            Ok(streams) => {
                LogContext::resolution_outcome(&request.film.title, provider_id, streams);
                MediaLinkResourceState::Success {
                    provider_id: provider_id.to_string(),
                    failures: Vec::new(),
                }
            }
            Err(failure) if failure.is_no_usable_streams() => MediaLinkResourceState::Unavailable {
                provider_id: Some(provider_id.to_string()),
                reason: failure.error.to_string(),
                failures: vec![failure],
            },
            Err(failure) => MediaLinkResourceState::Error {
                failures: vec![failure],
            },
        }
    }

    async fn run_automatic(&self, request: &LinkRequest, tx: &Emitter) -> MediaLinkResourceState {
        let candidates = self.candidates(request).await;
        if candidates.is_empty() {
            return MediaLinkResourceState::Unavailable {
                provider_id: None,
                reason: format!("No enabled provider supports '{}'", request.film.title),
                failures: Vec::new(),
            };
        }

        // A usable cached result from any candidate beats a network round trip.
        // Only the lookup that answers counts in the cache stats.
        let cached = candidates
            .iter()
            .map(|api| request.cache_key(api.provider_id()))
            .find(|key| !self.cache.usable_streams(key).is_empty());
        if let Some((provider_id, hit)) =
            cached.and_then(|key| Some((key.provider_id.clone(), self.cache.get_cache(&key)?)))
        {
            log_debug!("Resolve: cache hit for '{}' via {}", request.film.title, provider_id);
            let _ = tx.unbounded_send(MediaLinkResourceState::PartialResult {
                provider_id: provider_id.clone(),
                streams: hit.streams,
            });
            return MediaLinkResourceState::Success {
                provider_id,
                failures: Vec::new(),
            };
        }

        let mut failures = Vec::new();
        for api in &candidates {
            match self.resolve_with(api, request, tx).await {
                Ok(streams) => {
                    LogContext::resolution_outcome(&request.film.title, api.provider_id(), streams);
                    return MediaLinkResourceState::Success {
                        provider_id: api.provider_id().to_string(),
                        failures,
                    };
                }
                Err(failure) => failures.push(failure),
            }
        }

        log_info!(
            "Resolve: all {} providers failed for '{}'",
            failures.len(),
            request.film.title
        );

        if failures.iter().all(ProviderFailure::is_no_usable_streams) {
            MediaLinkResourceState::Unavailable {
                provider_id: None,
                reason: format!("No provider had usable streams for '{}'", request.film.title),
                failures,
            }
        } else {
            MediaLinkResourceState::Error { failures }
        }
    }

    /// APIs eligible for automatic resolution, in registry order
    async fn candidates(&self, request: &LinkRequest) -> Vec<ProviderApiHandle> {
        let mut candidates = Vec::new();

        for provider in self.providers.list().await {
            let metadata = provider.metadata();
            if !metadata.status.is_usable()
                || !metadata.provider_type.supports(request.film.film_type)
                || !self.providers.is_enabled(&metadata.id).await
            {
                continue;
            }
            if let Some(api) = self.apis.get_api(&metadata.id) {
                candidates.push(api);
            }
        }

        if self.max_provider_attempts > 0 {
            candidates.truncate(self.max_provider_attempts);
        }
        candidates
    }

    /// Resolve against one provider, returning how many usable streams it produced
    async fn resolve_with(
        &self,
        api: &ProviderApiHandle,
        request: &LinkRequest,
        tx: &Emitter,
    ) -> Result<usize, ProviderFailure> {
        let provider_id = api.provider_id();
        let key = request.cache_key(provider_id);
        let fail = |error: AppError| {
            LogContext::resolution_failure(provider_id, &request.film.title, &error);
            ProviderFailure::new(provider_id, error)
        };

        if let Some(hit) = self.cache.get_cache(&key) {
            let _ = tx.unbounded_send(MediaLinkResourceState::PartialResult {
                provider_id: provider_id.to_string(),
                streams: hit.streams.clone(),
            });
            return Ok(hit.streams.len());
        }

        if !api.is_alive() {
            return Err(fail(AppError::ProviderNotLoaded(provider_id.to_string())));
        }

        let _ = tx.unbounded_send(MediaLinkResourceState::Fetching {
            provider_id: provider_id.to_string(),
        });
        let (watch_id, details, episode) = self.discover(api, request, &key).await.map_err(fail)?;

        self.cache.store_cache(
            &key,
            CachedLinks::new(&watch_id, provider_id).with_thumbnail(api.api().thumbnail()),
        );

        let _ = tx.unbounded_send(MediaLinkResourceState::Extracting {
            provider_id: provider_id.to_string(),
        });

        let mut reported = 0;
        let mut links = api.api().get_links(&watch_id, &details, episode.as_ref());
        while let Some(item) = links.next().await {
            match item {
                Ok(MediaLink::Stream(stream)) => {
                    if !self.cache.add_stream(&key, stream) {
                        continue;
                    }
                    let usable = self.cache.usable_streams(&key);
                    if usable.len() > reported {
                        reported = usable.len();
                        let _ = tx.unbounded_send(MediaLinkResourceState::PartialResult {
                            provider_id: provider_id.to_string(),
                            streams: usable,
                        });
                    }
                }
                Ok(MediaLink::Subtitle(subtitle)) => {
                    self.cache.add_subtitle(&key, subtitle);
                }
                // Whatever arrived before the error stays cached
                Err(e) => return Err(fail(AppError::resolution(provider_id, &e))),
            }
        }

        match self.cache.usable_streams(&key).len() {
            0 => Err(fail(AppError::NoUsableStreams {
                provider_id: provider_id.to_string(),
            })),
            found => Ok(found),
        }
    }

    /// Provider-side watch id, details and episode for the requested film
    async fn discover(
        &self,
        api: &ProviderApiHandle,
        request: &LinkRequest,
        key: &CacheKey,
    ) -> Result<(String, FilmDetails, Option<Episode>), AppError> {
        let provider_id = api.provider_id();

        if let Some(watch_id) = request.film.watch_id_for(provider_id) {
            return Ok((watch_id.to_string(), request.film.clone(), request.episode.clone()));
        }

        // A known watch id skips the search, never the provider's own details
        if let Some(known) = self
            .cache
            .peek(&alias_of(key))
            .filter(|links| !links.watch_id.is_empty())
        {
            log_debug!("Resolve: reusing watch id {} from {}", known.watch_id, provider_id);
            let item = SearchItem {
                id: known.watch_id,
                title: request.film.title.clone(),
                film_type: request.film.film_type,
                year: request.film.year,
                poster: request.film.poster.clone(),
            };
            return self.provider_details(api, request, &item).await;
        }

        let response = api
            .api()
            .search(&request.film.title, 1)
            .await
            .map_err(|e| AppError::resolution(provider_id, &e))?;

        let Some(item) = best_match(&request.film, &response.results) else {
            log_debug!(
                "Resolve: {} has no title matching '{}' among {} results",
                provider_id,
                request.film.title,
                response.results.len()
            );
            return Err(AppError::NoUsableStreams {
                provider_id: provider_id.to_string(),
            });
        };

        self.provider_details(api, request, item).await
    }

    /// Provider-side details for `item` and the matching provider episode
    async fn provider_details(
        &self,
        api: &ProviderApiHandle,
        request: &LinkRequest,
        item: &SearchItem,
    ) -> Result<(String, FilmDetails, Option<Episode>), AppError> {
        let provider_id = api.provider_id();
        let details = api
            .api()
            .get_metadata(item)
            .await
            .map_err(|e| AppError::resolution(provider_id, &e))?;

        let episode = request.episode.as_ref().map(|wanted| {
            details
                .find_episode(wanted.key())
                .cloned()
                .unwrap_or_else(|| wanted.clone())
        });

        Ok((item.id.clone(), details.from_provider(provider_id), episode))
    }
}
