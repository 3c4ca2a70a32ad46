//! Tauri shell: managed context, commands, the `phrasebook://` scheme routed
//! through the offline proxy, and webview events for painting. The main
//! window is opened on that scheme so every page request reaches the proxy.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tauri::http::{header, Response, StatusCode};
use tauri::{Emitter, Manager, RunEvent, WebviewUrl, WebviewWindowBuilder};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bootstrap::AppServices;
use crate::config::{AppConfig, APP_SCHEME};
use crate::diagnostics::TracingDiagnostics;
use crate::events::{run_event_loop, EventQueue};
use crate::lifecycle::{LifecycleController, LifecycleEvent};
use crate::metrics::{MetricSummary, MetricsRegistry};
use crate::offline::network::{Network, NetworkError};
use crate::offline::{CacheProxy, CachedResponse, Request};
use crate::phrases::{BundleError, Phrase};
use crate::render::html::to_html;
use crate::render::Node;
use crate::surface::Surface;

/// Compiled-in copy of the phrase bundle, used when the proxy has none.
const BUNDLED_PHRASES: &[u8] = include_bytes!("../../web/data/phrases.json");

/// Shared application state managed by Tauri.
pub struct AppContext {
    pub controller: Arc<LifecycleController>,
    pub proxy: Arc<CacheProxy>,
    pub queue: EventQueue,
    pub metrics: Arc<MetricsRegistry>,
    pub shutdown: CancellationToken,
}

/// Paints by emitting HTML to the webview.
struct TauriSurface {
    app: tauri::AppHandle,
}

impl Surface for TauriSurface {
    fn paint(&self, tree: &Node) {
        if let Err(e) = self.app.emit("render", to_html(tree)) {
            warn!(error = %e, "render emit failed");
        }
    }

    fn update_connectivity(&self, indicator: &Node) {
        if let Err(e) = self.app.emit("connectivity", to_html(indicator)) {
            warn!(error = %e, "connectivity emit failed");
        }
    }
}

/// The frontend compiled into the binary, served as the app origin.
struct BundledAssets {
    app: tauri::AppHandle,
}

impl Network for BundledAssets {
    fn fetch<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<CachedResponse, NetworkError>> {
        Box::pin(async move {
            if !request.is_get() {
                return Ok(status_response(405));
            }
            let path = match request.url.path() {
                "/" => "/index.html".to_string(),
                other => other.to_string(),
            };
            Ok::<_, NetworkError>(match self.app.asset_resolver().get(path) {
                Some(asset) => CachedResponse {
                    status: 200,
                    headers: vec![("content-type".to_string(), asset.mime_type().to_string())],
                    body: asset.bytes().to_vec(),
                },
                None => status_response(404),
            })
        })
    }
}

fn status_response(status: u16) -> CachedResponse {
    CachedResponse {
        status,
        headers: vec![],
        body: vec![],
    }
}

/// Custom schemes are exposed as `http://<scheme>.localhost` on Windows and
/// Android and as `<scheme>://localhost` elsewhere.
fn webview_url() -> String {
    if cfg!(any(windows, target_os = "android")) {
        format!("http://{APP_SCHEME}.localhost/")
    } else {
        format!("{APP_SCHEME}://localhost/")
    }
}

// --- Tauri Commands ---

#[tauri::command]
async fn dispatch(ctx: tauri::State<'_, AppContext>, event: LifecycleEvent) -> Result<(), String> {
    if ctx.queue.submit(event).await {
        Ok(())
    } else {
        Err("event loop stopped".to_string())
    }
}

#[tauri::command]
fn current_view(ctx: tauri::State<'_, AppContext>) -> String {
    to_html(&ctx.controller.current_view())
}

#[tauri::command]
async fn offline_phrases(ctx: tauri::State<'_, AppContext>) -> Result<Vec<Phrase>, String> {
    ctx.controller
        .offline_phrases()
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
fn get_metrics_summary(ctx: tauri::State<'_, AppContext>) -> HashMap<String, MetricSummary> {
    ctx.metrics.summary()
}

/// Answer a `phrasebook://` request from the proxy, then from the embedded
/// frontend assets.
async fn serve_scheme(app: tauri::AppHandle, path: String) -> Response<Vec<u8>> {
    let Some(ctx) = app.try_state::<AppContext>() else {
        return status_only(StatusCode::SERVICE_UNAVAILABLE);
    };

    match ctx.proxy.shell().resolve(&path) {
        Ok(url) => match ctx.proxy.respond(&Request::get(url)).await {
            Ok(answer) => {
                let mut builder = Response::builder().status(answer.response.status);
                for (name, value) in &answer.response.headers {
                    if name.eq_ignore_ascii_case("content-type")
                        || name.eq_ignore_ascii_case("cache-control")
                    {
                        builder = builder.header(name.as_str(), value.as_str());
                    }
                }
                if let Ok(response) = builder.body(answer.response.body) {
                    return response;
                }
            }
            Err(e) => warn!(%path, error = %e, "proxy could not answer, trying embedded assets"),
        },
        Err(e) => warn!(%path, error = %e, "unresolvable scheme path"),
    }

    let asset_path = if path == "/" { "/index.html".to_string() } else { path };
    match app.asset_resolver().get(asset_path) {
        Some(asset) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, asset.mime_type())
            .body(asset.bytes().to_vec())
            .unwrap_or_else(|_| status_only(StatusCode::INTERNAL_SERVER_ERROR)),
        None => status_only(StatusCode::NOT_FOUND),
    }
}

fn status_only(status: StatusCode) -> Response<Vec<u8>> {
    let mut response = Response::new(Vec::new());
    *response.status_mut() = status;
    response
}

fn config_path() -> Option<PathBuf> {
    std::env::var_os("PHRASEBOOK_CONFIG").map(PathBuf::from)
}

/// Build and run the Tauri application.
pub fn run() {
    crate::init_tracing();
    info!("phrasebook starting");

    tauri::Builder::default()
        .plugin(tauri_plugin_shell::init())
        .register_asynchronous_uri_scheme_protocol(APP_SCHEME, |ctx, request, responder| {
            let app = ctx.app_handle().clone();
            let path = request.uri().path().to_string();
            tauri::async_runtime::spawn(async move {
                responder.respond(serve_scheme(app, path).await);
            });
        })
        .setup(|app| {
            let handle = app.handle().clone();
            let mut config = AppConfig::load(config_path().as_deref());
            if let Ok(dir) = app.path().app_data_dir() {
                config = config.with_default_data_dir(dir);
            }

            let bundled = Arc::new(BundledAssets {
                app: handle.clone(),
            });
            let services = AppServices::connect(config, bundled, Arc::new(TracingDiagnostics))?;
            let surface = Arc::new(TauriSurface {
                app: handle.clone(),
            });

            let (controller, queue, shutdown) = tauri::async_runtime::block_on(async {
                let book = services.load_bundle(BUNDLED_PHRASES).await?;
                let controller = Arc::new(services.controller(book, surface, true));
                let (queue, rx) = EventQueue::new();
                let shutdown = CancellationToken::new();
                tauri::async_runtime::spawn(run_event_loop(
                    Arc::clone(&controller),
                    rx,
                    shutdown.clone(),
                ));
                queue.submit(LifecycleEvent::Startup).await;
                Ok::<_, BundleError>((controller, queue, shutdown))
            })?;

            app.manage(AppContext {
                controller,
                proxy: Arc::clone(&services.proxy),
                queue,
                metrics: Arc::clone(&services.metrics),
                shutdown,
            });

            let url: tauri::Url = webview_url().parse()?;
            WebviewWindowBuilder::new(app, "main", WebviewUrl::CustomProtocol(url))
                .title("Phrasebook")
                .inner_size(420.0, 780.0)
                .resizable(true)
                .build()?;

            info!("phrasebook setup complete");
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            dispatch,
            current_view,
            offline_phrases,
            get_metrics_summary,
        ])
        .build(tauri::generate_context!())
        .expect("error while building phrasebook")
        .run(|app, event| {
            if let RunEvent::Exit = event {
                if let Some(ctx) = app.try_state::<AppContext>() {
                    ctx.shutdown.cancel();
                    tauri::async_runtime::block_on(ctx.controller.flush());
                }
                info!("phrasebook exiting");
            }
        });
}
