//! Lifecycle controller: startup sequence, click dispatch, visibility and
//! connectivity handling.
//!
//! Startup runs proxy registration, state restore, phrase mirroring and the
//! first render strictly in that order. After that every event runs to
//! completion before the next one is looked at. Persistence is best effort:
//! failures go to [`Diagnostics`] and the UI keeps working from memory and
//! the preference mirror.

use std::path::PathBuf;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::diagnostics::{Diagnostics, Operation};
use crate::metrics::{metric_names, MetricsRegistry};
use crate::offline::CacheProxy;
use crate::phrases::{Phrase, PhraseBook};
use crate::prefs::PreferenceMirror;
use crate::render::{connectivity_indicator, render_app, Connectivity, Node};
use crate::store::writer::PersistWriter;
use crate::store::{KvStore, StoreError};
use crate::surface::Surface;
use crate::ui_state::{StateOwner, UiAction, UiState, UiStateError};

pub type PlatformError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Everything the host can tell the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum LifecycleEvent {
    Startup,
    Visibility(Visibility),
    /// `true` when online.
    Connectivity(bool),
    /// A click anywhere; `None` when the target carries no action.
    Click(Option<UiAction>),
}

/// Host capabilities used during startup.
pub trait Platform: Send + Sync {
    fn supports_offline_proxy(&self) -> bool;
    fn register_offline_proxy(&self) -> BoxFuture<'_, Result<(), PlatformError>>;
    /// Ask for storage that survives eviction. `Ok(false)` means denied.
    fn request_persistent_storage(&self) -> BoxFuture<'_, Result<bool, PlatformError>>;
}

/// No proxy support. Startup skips registration entirely.
pub struct HeadlessPlatform;

impl Platform for HeadlessPlatform {
    fn supports_offline_proxy(&self) -> bool {
        false
    }

    fn register_offline_proxy(&self) -> BoxFuture<'_, Result<(), PlatformError>> {
        Box::pin(async { Err::<(), PlatformError>("offline proxy not supported".into()) })
    }

    fn request_persistent_storage(&self) -> BoxFuture<'_, Result<bool, PlatformError>> {
        Box::pin(async { Ok::<_, PlatformError>(false) })
    }
}

/// Platform backed by a [`CacheProxy`]. Persistent storage means the data
/// directory exists on disk.
pub struct OfflinePlatform {
    proxy: Arc<CacheProxy>,
    data_dir: Option<PathBuf>,
}

impl OfflinePlatform {
    pub fn new(proxy: Arc<CacheProxy>, data_dir: Option<PathBuf>) -> Self {
        Self { proxy, data_dir }
    }
}

impl Platform for OfflinePlatform {
    fn supports_offline_proxy(&self) -> bool {
        true
    }

    fn register_offline_proxy(&self) -> BoxFuture<'_, Result<(), PlatformError>> {
        Box::pin(async move {
            let registration = self.proxy.register().await?;
            debug!(?registration, "offline proxy registered");
            Ok::<_, PlatformError>(())
        })
    }

    fn request_persistent_storage(&self) -> BoxFuture<'_, Result<bool, PlatformError>> {
        Box::pin(async move {
            match &self.data_dir {
                Some(dir) => {
                    tokio::fs::create_dir_all(dir).await?;
                    Ok::<_, PlatformError>(true)
                }
                None => Ok(false),
            }
        })
    }
}

/// Collaborators for [`LifecycleController::new`].
pub struct ControllerDeps {
    pub book: Arc<PhraseBook>,
    pub store: KvStore,
    pub mirror: PreferenceMirror,
    pub platform: Arc<dyn Platform>,
    pub surface: Arc<dyn Surface>,
    pub diagnostics: Arc<dyn Diagnostics>,
    pub metrics: Arc<MetricsRegistry>,
}

pub struct LifecycleController {
    book: Arc<PhraseBook>,
    store: KvStore,
    writer: PersistWriter,
    mirror: PreferenceMirror,
    platform: Arc<dyn Platform>,
    surface: Arc<dyn Surface>,
    diagnostics: Arc<dyn Diagnostics>,
    metrics: Arc<MetricsRegistry>,
    state: StateOwner,
    connectivity: RwLock<Connectivity>,
}

impl LifecycleController {
    /// Seeds the UI state from the preference mirror so a first paint is
    /// possible before the store answers. Must be called inside a Tokio
    /// runtime (the persistence writer is spawned here).
    pub fn new(deps: ControllerDeps, online: bool) -> Self {
        let language = deps
            .mirror
            .target_language()
            .filter(|code| deps.book.is_supported(code))
            .unwrap_or_else(|| deps.book.default_language().code.clone());
        let initial = UiState::new(language, deps.mirror.show_polite());
        info!(language = %initial.target_language, polite = initial.show_polite, "initial ui state");

        let writer = PersistWriter::spawn(deps.store.clone(), Arc::clone(&deps.diagnostics));
        Self {
            book: deps.book,
            store: deps.store,
            writer,
            mirror: deps.mirror,
            platform: deps.platform,
            surface: deps.surface,
            diagnostics: deps.diagnostics,
            metrics: deps.metrics,
            state: StateOwner::new(initial),
            connectivity: RwLock::new(Connectivity::from_online(online)),
        }
    }

    pub fn book(&self) -> &Arc<PhraseBook> {
        &self.book
    }

    pub fn state(&self) -> UiState {
        self.state.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<UiState> {
        self.state.subscribe()
    }

    pub fn connectivity(&self) -> Connectivity {
        *self.connectivity.read()
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Register the proxy, restore, mirror phrases, then paint.
    pub async fn start(&self) -> Node {
        if self.platform.supports_offline_proxy() {
            if let Err(e) = self.platform.register_offline_proxy().await {
                self.diagnostics
                    .best_effort_failed(Operation::RegisterProxy, &e);
            }
            match self.platform.request_persistent_storage().await {
                Ok(granted) => debug!(granted, "persistent storage requested"),
                Err(e) => self
                    .diagnostics
                    .best_effort_failed(Operation::PersistentStorage, &e),
            }
        }

        self.restore().await;
        self.mirror_phrases().await;
        let tree = self.render();
        info!(phrases = self.book.phrases().len(), "startup complete");
        tree
    }

    /// Overlay the stored UI state on the live state and echo it into the
    /// preference mirror. Returns the resulting snapshot.
    pub async fn restore(&self) -> UiState {
        let span = self.metrics.span(metric_names::RESTORE_STATE);
        let result = self.store.load_ui_state().await;
        span.finish();

        match result {
            Ok(Some(persisted)) => {
                let next = self.state.restore(&persisted, &self.book);
                if persisted.target_language.is_some() || persisted.show_polite.is_some() {
                    self.mirror.write_state(&next);
                }
                debug!(language = %next.target_language, polite = next.show_polite, "ui state restored");
                next
            }
            Ok(None) => self.state.current(),
            Err(e) => {
                self.diagnostics
                    .best_effort_failed(Operation::RestoreState, &e);
                self.state.current()
            }
        }
    }

    /// Copy the bundled phrases into the store for offline listing.
    pub async fn mirror_phrases(&self) {
        if self.book.phrases().is_empty() {
            return;
        }
        let span = self.metrics.span(metric_names::MIRROR_PHRASES);
        let result = self.store.put_phrases(self.book.phrases()).await;
        span.finish();
        if let Err(e) = result {
            self.diagnostics
                .best_effort_failed(Operation::MirrorPhrases, &e);
        }
    }

    /// Current tree without painting it.
    pub fn current_view(&self) -> Node {
        render_app(&self.book, &self.state.current(), self.connectivity())
    }

    /// Rebuild the whole tree and paint it.
    pub fn render(&self) -> Node {
        let span = self.metrics.span(metric_names::RENDER);
        let tree = self.current_view();
        self.surface.paint(&tree);
        span.finish();
        tree
    }

    /// Single top-level click dispatcher.
    ///
    /// An open selector is closed once by any click outside it, before the
    /// clicked action runs. At most one repaint per click. Returns the painted
    /// tree, or `None` when nothing changed.
    pub fn on_click(&self, action: Option<UiAction>) -> Result<Option<Node>, UiStateError> {
        let inside_selector = action
            .as_ref()
            .map(UiAction::is_inside_selector)
            .unwrap_or(false);

        let mut changed = false;
        if self.state.current().dropdown_open && !inside_selector {
            self.state.apply(&UiAction::Dismiss, &self.book)?;
            changed = true;
        }

        if let Some(action) = action.filter(|a| *a != UiAction::Dismiss) {
            match self.state.apply(&action, &self.book) {
                Ok(next) => {
                    if action.persists() {
                        self.persist(&next);
                    }
                    changed = true;
                }
                Err(e) => {
                    if changed {
                        self.render();
                    }
                    return Err(e);
                }
            }
        }

        Ok(changed.then(|| self.render()))
    }

    fn persist(&self, state: &UiState) {
        self.mirror.write_state(state);
        self.writer.save_ui_state(state.persisted());
    }

    /// Hidden snapshots the state; visible restores it and repaints.
    pub async fn on_visibility(&self, visibility: Visibility) {
        match visibility {
            Visibility::Hidden => {
                self.writer.save_ui_state(self.state.current().persisted());
                debug!("ui state snapshot queued on hide");
            }
            Visibility::Visible => {
                // Queued snapshots land before the re-read.
                self.writer.flush().await;
                self.restore().await;
                self.render();
            }
        }
    }

    /// Update only the footer badge.
    pub fn on_connectivity(&self, online: bool) -> Node {
        let connectivity = Connectivity::from_online(online);
        *self.connectivity.write() = connectivity;
        let indicator = connectivity_indicator(connectivity);
        self.surface.update_connectivity(&indicator);
        info!(?connectivity, "connectivity changed");
        indicator
    }

    pub async fn handle(&self, event: LifecycleEvent) -> Result<(), UiStateError> {
        match event {
            LifecycleEvent::Startup => {
                self.start().await;
            }
            LifecycleEvent::Visibility(visibility) => self.on_visibility(visibility).await,
            LifecycleEvent::Connectivity(online) => {
                self.on_connectivity(online);
            }
            LifecycleEvent::Click(action) => {
                self.on_click(action)?;
            }
        }
        Ok(())
    }

    /// Phrases mirrored into the store by this or an earlier run.
    pub async fn offline_phrases(&self) -> Result<Vec<Phrase>, StoreError> {
        self.store.phrases().await
    }

    /// Wait for queued persistence writes.
    pub async fn flush(&self) {
        self.writer.flush().await;
    }
}
