use crate::modules::provider::{
    domain::{ProviderMetadata, ProviderPreference, ProviderPreferences},
    infrastructure::loader::LoadedProvider,
};
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::logger::LogContext;
use crate::{log_debug, log_info};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Ordered collection of loaded providers.
///
/// The in-memory list is authoritative during a session; the preference order is
/// read once at startup with [`ProviderRegistry::restore_order`] and written back
/// whenever a caller asks for it. A failed write is logged and never undoes the
/// in-memory change.
pub struct ProviderRegistry {
    entries: RwLock<Vec<Arc<LoadedProvider>>>,
    order: RwLock<Vec<ProviderPreference>>,
    preferences: Arc<dyn ProviderPreferences>,
}

impl ProviderRegistry {
    pub fn new(preferences: Arc<dyn ProviderPreferences>) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            order: RwLock::new(Vec::new()),
            preferences,
        }
    }

    /// Read the persisted order and re-sort whatever is already loaded
    pub async fn restore_order(&self) -> AppResult<()> {
        let persisted = self.preferences.load().await?;
        log_info!("Restored order for {} providers", persisted.len());

        let mut entries = self.entries.write().await;
        let mut order = self.order.write().await;
        *order = persisted;
        entries.sort_by_key(|entry| rank_of(&order, entry.id()));
        Ok(())
    }

    /// Add a provider; an entry with the same id is replaced in place and returned
    pub async fn add(
        &self,
        provider: Arc<LoadedProvider>,
        sync_preferences: bool,
    ) -> Option<Arc<LoadedProvider>> {
        let id = provider.id().to_string();

        let (replaced, snapshot) = {
            let mut entries = self.entries.write().await;
            let mut order = self.order.write().await;

            if !order.iter().any(|pref| pref.id == id) {
                order.push(ProviderPreference::new(&id, &provider.metadata().name));
            }

            let replaced = match entries.iter().position(|entry| entry.id() == id) {
                Some(index) => Some(std::mem::replace(&mut entries[index], provider)),
                None => {
                    let rank = rank_of(&order, &id);
                    let index = entries
                        .iter()
                        .position(|entry| rank_of(&order, entry.id()) > rank)
                        .unwrap_or(entries.len());
                    entries.insert(index, provider);
                    None
                }
            };

            (replaced, order.clone())
        };

        match &replaced {
            Some(old) => log_info!(
                "Replaced provider {} ({} -> new version)",
                id,
                old.metadata().version_name
            ),
            None => log_debug!("Added provider {}", id),
        }

        if sync_preferences {
            self.persist(&snapshot).await;
        }
        replaced
    }

    /// Remove a provider by id, returning it when it was present
    pub async fn remove(&self, id: &str, sync_preferences: bool) -> Option<Arc<LoadedProvider>> {
        let (removed, snapshot) = {
            let mut entries = self.entries.write().await;
            let mut order = self.order.write().await;

            let removed = entries
                .iter()
                .position(|entry| entry.id() == id)
                .map(|index| entries.remove(index));

            if sync_preferences {
                order.retain(|pref| pref.id != id);
            }
            (removed, order.clone())
        };

        if removed.is_some() {
            log_debug!("Removed provider {}", id);
        }

        if sync_preferences {
            self.persist(&snapshot).await;
        }
        removed
    }

    pub async fn get_provider(&self, id: &str) -> Option<Arc<LoadedProvider>> {
        self.entries
            .read()
            .await
            .iter()
            .find(|entry| entry.id() == id)
            .cloned()
    }

    /// Loaded providers in preference order
    pub async fn list(&self) -> Vec<Arc<LoadedProvider>> {
        self.entries.read().await.clone()
    }

    pub async fn list_metadata(&self) -> Vec<ProviderMetadata> {
        self.entries
            .read()
            .await
            .iter()
            .map(|entry| entry.metadata().clone())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Disabled providers stay loaded but are skipped by automatic resolution
    pub async fn is_enabled(&self, id: &str) -> bool {
        self.order
            .read()
            .await
            .iter()
            .find(|pref| pref.id == id)
            .map(|pref| !pref.is_disabled)
            .unwrap_or(true)
    }

    pub async fn set_enabled(&self, id: &str, enabled: bool, sync_preferences: bool) -> AppResult<()> {
        let snapshot = {
            let mut order = self.order.write().await;
            let pref = order
                .iter_mut()
                .find(|pref| pref.id == id)
                .ok_or_else(|| AppError::ProviderNotLoaded(id.to_string()))?;
            pref.is_disabled = !enabled;
            order.clone()
        };

        if sync_preferences {
            self.persist(&snapshot).await;
        }
        Ok(())
    }

    /// Move a loaded provider to `index` (clamped), shifting the others
    pub async fn move_to(&self, id: &str, index: usize, sync_preferences: bool) -> AppResult<()> {
        let snapshot = {
            let mut entries = self.entries.write().await;
            let mut order = self.order.write().await;

            let from = entries
                .iter()
                .position(|entry| entry.id() == id)
                .ok_or_else(|| AppError::ProviderNotLoaded(id.to_string()))?;
            let entry = entries.remove(from);
            let to = index.min(entries.len());
            entries.insert(to, entry);

            // Loaded providers first in their new order, then remembered-but-unloaded ones
            let mut reordered: Vec<ProviderPreference> = entries
                .iter()
                .map(|entry| {
                    order
                        .iter()
                        .find(|pref| pref.id == entry.id())
                        .cloned()
                        .unwrap_or_else(|| {
                            ProviderPreference::new(entry.id(), &entry.metadata().name)
                        })
                })
                .collect();
            reordered.extend(
                order
                    .iter()
                    .filter(|pref| !entries.iter().any(|entry| entry.id() == pref.id))
                    .cloned(),
            );
            *order = reordered;
            order.clone()
        };

        if sync_preferences {
            self.persist(&snapshot).await;
        }
        Ok(())
    }

    async fn persist(&self, snapshot: &[ProviderPreference]) {
        if let Err(e) = self.preferences.save(snapshot).await {
            LogContext::error_with_context(&e, "Failed to save provider preferences");
        }
    }
}

fn rank_of(order: &[ProviderPreference], id: &str) -> usize {
    order
        .iter()
        .position(|pref| pref.id == id)
        .unwrap_or(usize::MAX)
}
