//! Resolution engine: overwrites, cache, behavior mode and upstream

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::behavior;
use crate::config::{Config, Settings, SettingsPatch};
use crate::feedback;
use crate::fingerprint::{ProxyRequest, RequestFingerprint};
use crate::network::{HttpFetcher, UpstreamFetcher};
use crate::overwrite::{OverwriteSet, Overwrites};
use crate::response::CachedResponse;
use crate::state::Resettable;
use crate::storage::{DiskStore, ResponseStore};
use crate::Result;

/// Resolves requests against overwrites, the cache and the upstream
///
/// Concurrent misses for the same fingerprint are not deduplicated: each
/// fetches and saves, and the last write wins.
pub struct ResolutionEngine {
    store: Arc<dyn ResponseStore>,
    fetcher: Arc<dyn UpstreamFetcher>,
    settings: RwLock<Resettable<Settings>>,
    overwrites: RwLock<Overwrites>,
}

impl ResolutionEngine {
    /// Create an engine from its parts
    #[must_use]
    pub fn new(
        settings: Settings,
        overwrites: Overwrites,
        store: Arc<dyn ResponseStore>,
        fetcher: Arc<dyn UpstreamFetcher>,
    ) -> Self {
        Self {
            store,
            fetcher,
            settings: RwLock::new(Resettable::new(settings)),
            overwrites: RwLock::new(overwrites),
        }
    }

    /// Engine with a disk store and an HTTP upstream, as configured
    ///
    /// # Errors
    ///
    /// Returns error if the overwrites file or the HTTP client cannot be set up
    pub fn from_config(config: &Config) -> Result<Self> {
        let overwrites = match &config.overwrites_file {
            Some(path) => Overwrites::from_file(path)?,
            None => Overwrites::default(),
        };

        Ok(Self::new(
            config.settings.clone(),
            overwrites,
            Arc::new(DiskStore::new(config.cache_dir.as_slice())),
            Arc::new(HttpFetcher::new()?),
        ))
    }

    /// The backing store
    #[must_use]
    pub fn store(&self) -> &dyn ResponseStore {
        self.store.as_ref()
    }

    /// Copy of the current settings
    pub async fn settings(&self) -> Settings {
        self.settings.read().await.current().clone()
    }

    /// Merge `patch` into the current settings
    pub async fn modify_settings(&self, patch: SettingsPatch) {
        let mut settings = self.settings.write().await;
        settings.modify(|current| current.patched(patch));
        info!("Settings changed, proxy behavior is {}", settings.current().proxy_behavior);
    }

    /// Restore the settings given at construction
    pub async fn reset_settings(&self) {
        self.settings.write().await.reset();
    }

    /// Add or replace overwrites
    pub async fn modify_overwrites(&self, additional: OverwriteSet) {
        self.overwrites.write().await.merge(additional);
    }

    /// Restore the overwrites given at construction
    pub async fn reset_overwrites(&self) {
        self.overwrites.write().await.reset();
    }

    /// Overwrite or stored response for `id`
    pub async fn local_response(&self, id: &RequestFingerprint) -> Option<CachedResponse> {
        if let Some(response) = self.overwrites.read().await.get(id) {
            debug!("Overwrite hit: {}", id);
            return Some(response.clone());
        }

        let stored = self.store.get(id);
        if stored.is_some() {
            debug!("Cache hit: {}", id);
        }
        stored
    }

    /// Pick the response for `request` according to the active behavior mode
    ///
    /// # Errors
    ///
    /// Returns `NoCachedResponse` when forwarding is disabled and nothing is stored
    pub async fn resolve(&self, request: &ProxyRequest) -> Result<CachedResponse> {
        let settings = self.settings().await;
        let local = self.local_response(&request.id).await;

        behavior::resolve(settings.proxy_behavior, &request.id, local, || {
            self.fetch_and_save(request, &settings)
        })
        .await
    }

    /// Resolve and report on the result
    ///
    /// # Errors
    ///
    /// Same as [`ResolutionEngine::resolve`]
    pub async fn handle(&self, request: &ProxyRequest) -> Result<CachedResponse> {
        let response = self.resolve(request).await?;
        let settings = self.settings().await;
        feedback::report(&settings, self.store(), request, &response);
        Ok(response)
    }

    async fn fetch_and_save(&self, request: &ProxyRequest, settings: &Settings) -> CachedResponse {
        debug!(
            "Fetching {} {} from {}:{}",
            request.method, request.url, settings.source_host, settings.source_port
        );
        let response = self
            .fetcher
            .fetch(request, &settings.source_host, settings.source_port)
            .await;
        self.store.save(request, &response);
        response
    }

    /// Delete stored responses and prune their log entries
    pub fn delete_responses(&self, ids: &[RequestFingerprint]) {
        for id in ids {
            self.store.delete(id);
        }
        self.store.prune_log(ids);
    }
}
