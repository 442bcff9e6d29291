use super::provider_registry::ProviderRegistry;
use crate::modules::provider::{
    domain::ProviderMetadata,
    infrastructure::loader::{LoadedProvider, ModuleHandle},
    traits::{ProviderApi, ProviderContext},
};
use crate::shared::errors::{AppError, AppResult};
use crate::{log_debug, log_warn};
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::debug;

const EVENT_CAPACITY: usize = 64;

/// Structural change to the API registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiRegistryEvent {
    Added(String),
    Removed(String),
}

/// Builds the context handed to provider code
#[derive(Debug, Clone)]
pub struct ProviderContextFactory {
    http: reqwest::Client,
    data_root: PathBuf,
}

impl ProviderContextFactory {
    pub fn new(http: reqwest::Client, data_root: impl Into<PathBuf>) -> Self {
        Self {
            http,
            data_root: data_root.into(),
        }
    }

    pub fn context_for(&self, provider_id: &str) -> ProviderContext {
        ProviderContext {
            provider_id: provider_id.to_string(),
            http: self.http.clone(),
            data_dir: self
                .data_root
                .join(crate::modules::provider::domain::sanitize_path_segment(provider_id)),
        }
    }
}

/// API object of a loaded provider.
///
/// Clones keep the provider's module mapped, so a resolution holding a handle can
/// outlive an unload; [`ProviderApiHandle::is_alive`] turns false once it happens.
#[derive(Clone)]
pub struct ProviderApiHandle {
    metadata: ProviderMetadata,
    // Declared before `module`: dropped first.
    api: Arc<dyn ProviderApi>,
    module: Arc<dyn ModuleHandle>,
}

impl ProviderApiHandle {
    pub fn new(
        metadata: ProviderMetadata,
        api: Arc<dyn ProviderApi>,
        module: Arc<dyn ModuleHandle>,
    ) -> Self {
        Self {
            metadata,
            api,
            module,
        }
    }

    pub fn provider_id(&self) -> &str {
        &self.metadata.id
    }

    pub fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    pub fn api(&self) -> &dyn ProviderApi {
        self.api.as_ref()
    }

    pub fn is_alive(&self) -> bool {
        !self.module.is_disposed()
    }
}

impl std::fmt::Debug for ProviderApiHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderApiHandle")
            .field("provider_id", &self.metadata.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

pub type ApiSnapshot = Arc<HashMap<String, ProviderApiHandle>>;

/// Observable map from provider id to its API object.
///
/// Every mutation builds a new map and publishes it as one value; the watch
/// channel's lock serialises writers and readers only ever see whole snapshots.
pub struct ProviderApiRegistry {
    providers: Arc<ProviderRegistry>,
    contexts: ProviderContextFactory,
    snapshots: watch::Sender<ApiSnapshot>,
    events: broadcast::Sender<ApiRegistryEvent>,
}

impl ProviderApiRegistry {
    pub fn new(providers: Arc<ProviderRegistry>, contexts: ProviderContextFactory) -> Self {
        let (snapshots, _) = watch::channel(Arc::new(HashMap::new()));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            providers,
            contexts,
            snapshots,
            events,
        }
    }

    pub fn contexts(&self) -> &ProviderContextFactory {
        &self.contexts
    }

    /// Derive and register the API object of a loaded provider
    pub fn add_api_from_provider(&self, id: &str, provider: &LoadedProvider) -> AppResult<()> {
        if !provider.is_alive() {
            return Err(AppError::ProviderNotLoaded(id.to_string()));
        }

        let ctx = self.contexts.context_for(id);
        let api = catch_unwind(AssertUnwindSafe(|| provider.provider().create_api(&ctx)))
            .map_err(|_| {
                AppError::LoadFailure(format!("Provider {} panicked while creating its API", id))
            })?
            .map_err(|e| {
                AppError::LoadFailure(format!("Provider {} failed to create its API: {:#}", id, e))
            })?;

        let handle = ProviderApiHandle::new(provider.metadata().clone(), api, provider.module());
        self.publish(|current| {
            let mut next = current.clone();
            next.insert(id.to_string(), handle);
            Some((next, ApiRegistryEvent::Added(id.to_string())))
        });

        log_debug!("Registered API for provider {}", id);
        Ok(())
    }

    /// Derive the API of a provider already in the provider registry
    pub async fn add_api_from_id(&self, id: &str) -> AppResult<()> {
        let provider = self
            .providers
            .get_provider(id)
            .await
            .ok_or_else(|| AppError::ProviderNotLoaded(id.to_string()))?;
        self.add_api_from_provider(id, &provider)
    }

    /// Remove a provider's API; returns whether it was registered
    pub fn remove_api(&self, id: &str) -> bool {
        let removed = self.publish(|current| {
            if !current.contains_key(id) {
                return None;
            }
            let mut next = current.clone();
            next.remove(id);
            Some((next, ApiRegistryEvent::Removed(id.to_string())))
        });

        if !removed {
            log_warn!("No API registered for provider {}", id);
        }
        removed
    }

    pub fn get_api(&self, id: &str) -> Option<ProviderApiHandle> {
        self.snapshots.borrow().get(id).cloned()
    }

    pub fn get_apis(&self) -> Vec<ProviderApiHandle> {
        self.snapshots.borrow().values().cloned().collect()
    }

    /// Current map, as one consistent value
    pub fn snapshot(&self) -> ApiSnapshot {
        Arc::clone(&self.snapshots.borrow())
    }

    /// Current map plus every future one
    pub fn subscribe_snapshots(&self) -> watch::Receiver<ApiSnapshot> {
        self.snapshots.subscribe()
    }

    /// Structural changes published after this call
    pub fn observe(&self) -> BoxStream<'static, ApiRegistryEvent> {
        let receiver = self.events.subscribe();
        stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => return Some((event, receiver)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("API registry observer lagged by {} events", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .boxed()
    }

    fn publish<F>(&self, mutate: F) -> bool
    where
        F: FnOnce(&HashMap<String, ProviderApiHandle>) -> Option<(HashMap<String, ProviderApiHandle>, ApiRegistryEvent)>,
    {
        let events = &self.events;
        self.snapshots.send_if_modified(|current| match mutate(current.as_ref()) {
            Some((next, event)) => {
                *current = Arc::new(next);
                // Sent under the snapshot lock so events and snapshots share one order
                let _ = events.send(event);
                true
            }
            None => false,
        })
    }
}
