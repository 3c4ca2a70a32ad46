//! Service assembly shared by the desktop shell and headless hosts.
//! Every persistent backend degrades to memory when it cannot be opened.

use std::path::Path;
use std::sync::Arc;

use reqwest::Url;
use tracing::{info, warn};

use crate::config::{AppConfig, APP_ORIGIN};
use crate::diagnostics::Diagnostics;
use crate::lifecycle::{ControllerDeps, LifecycleController, OfflinePlatform};
use crate::metrics::MetricsRegistry;
use crate::offline::manifest::ManifestError;
use crate::offline::network::{HttpNetwork, Network, OriginRouter};
use crate::offline::sqlite_storage::SqliteCacheStorage;
use crate::offline::storage::{CacheStorage, MemoryCacheStorage};
use crate::offline::{CacheProxy, ProxyError, Request};
use crate::phrases::{BundleError, PhraseBook};
use crate::prefs::{FilePreferences, PreferenceMirror};
use crate::store::sqlite::SqliteRecordStore;
use crate::store::KvStore;
use crate::surface::Surface;

pub struct AppServices {
    pub config: AppConfig,
    pub metrics: Arc<MetricsRegistry>,
    pub diagnostics: Arc<dyn Diagnostics>,
    pub proxy: Arc<CacheProxy>,
    pub store: KvStore,
    pub mirror: PreferenceMirror,
}

impl AppServices {
    /// Open every backend under `config.data_dir()`. Requests under
    /// [`APP_ORIGIN`] are answered by `bundled`; all others go over reqwest.
    pub fn connect(
        config: AppConfig,
        bundled: Arc<dyn Network>,
        diagnostics: Arc<dyn Diagnostics>,
    ) -> Result<Self, ProxyError> {
        let app_origin = Url::parse(APP_ORIGIN)
            .map_err(|e| ManifestError::InvalidScope(format!("{APP_ORIGIN}: {e}")))?;
        let remote = HttpNetwork::new(config.http_timeout())?;
        let network = OriginRouter::new(app_origin, bundled, Arc::new(remote));
        Self::open(config, Arc::new(network), diagnostics)
    }

    pub fn open(
        config: AppConfig,
        network: Arc<dyn Network>,
        diagnostics: Arc<dyn Diagnostics>,
    ) -> Result<Self, ProxyError> {
        if let Err(e) = std::fs::create_dir_all(config.data_dir()) {
            warn!(dir = %config.data_dir().display(), error = %e, "data dir unavailable");
        }

        let metrics = Arc::new(MetricsRegistry::new());
        let storage = open_cache_storage(&config.cache_path(), config.response_memo_capacity);
        let proxy = Arc::new(CacheProxy::new(
            config.cache_names(),
            config.app_shell()?,
            network,
            storage,
            Arc::clone(&metrics),
        ));
        let store = open_store(&config.store_path());
        let mirror = PreferenceMirror::new(
            Arc::new(FilePreferences::open(&config.prefs_path())),
            Arc::clone(&diagnostics),
        );

        Ok(Self {
            config,
            metrics,
            diagnostics,
            proxy,
            store,
            mirror,
        })
    }

    /// Fetch the phrase bundle through the proxy. Falls back to `bundled`
    /// when the proxy has no usable copy.
    pub async fn load_bundle(&self, bundled: &[u8]) -> Result<PhraseBook, BundleError> {
        match self.fetch_bundle().await {
            Ok(book) => Ok(book),
            Err(reason) => {
                warn!(%reason, "phrase bundle unavailable, using bundled copy");
                PhraseBook::from_json(bundled)
            }
        }
    }

    async fn fetch_bundle(&self) -> Result<PhraseBook, String> {
        let url = self
            .proxy
            .shell()
            .resolve(&self.config.bundle_path)
            .map_err(|e| e.to_string())?;
        let answer = self
            .proxy
            .respond(&Request::get(url))
            .await
            .map_err(|e| e.to_string())?;
        if !answer.response.is_ok() {
            return Err(format!("HTTP {}", answer.response.status));
        }
        let book = PhraseBook::from_json(&answer.response.body).map_err(|e| e.to_string())?;
        info!(source = ?answer.source, phrases = book.phrases().len(), "phrase bundle loaded");
        Ok(book)
    }

    /// Build the controller. Must run inside a Tokio runtime.
    pub fn controller(
        &self,
        book: PhraseBook,
        surface: Arc<dyn Surface>,
        online: bool,
    ) -> LifecycleController {
        let platform = OfflinePlatform::new(
            Arc::clone(&self.proxy),
            Some(self.config.data_dir().to_path_buf()),
        );
        LifecycleController::new(
            ControllerDeps {
                book: Arc::new(book),
                store: self.store.clone(),
                mirror: self.mirror.clone(),
                platform: Arc::new(platform),
                surface,
                diagnostics: Arc::clone(&self.diagnostics),
                metrics: Arc::clone(&self.metrics),
            },
            online,
        )
    }
}

/// SQLite store, or memory if the database cannot be opened.
pub fn open_store(path: &Path) -> KvStore {
    match SqliteRecordStore::open(path) {
        Ok(store) => KvStore::new(Arc::new(store)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "store unavailable, keeping state in memory");
            KvStore::in_memory()
        }
    }
}

pub fn open_cache_storage(path: &Path, memo_capacity: usize) -> Arc<dyn CacheStorage> {
    match SqliteCacheStorage::open(path, memo_capacity) {
        Ok(storage) => Arc::new(storage),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "offline cache unavailable, using memory");
            Arc::new(MemoryCacheStorage::new())
        }
    }
}
