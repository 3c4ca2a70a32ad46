//! Offline cache proxy: precaches the app shell at install, drops stale
//! partitions at activation, and answers intercepted GETs cache-first
//! (app shell) or network-first with a dynamic cache fallback.

pub mod manifest;
pub mod network;
pub mod sqlite_storage;
pub mod storage;
pub mod worker_state;

use std::sync::Arc;

use futures_util::future::try_join_all;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::metrics::{metric_names, FetchId, MetricsRegistry};
use manifest::{AppShell, ManifestError};
use network::{Network, NetworkError};
use storage::{CacheStorage, StorageError};
use worker_state::{WorkerState, WorkerStateMachine};

/// Request identity as seen by the proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub url: Url,
}

impl Request {
    pub fn new(method: impl Into<String>, url: Url) -> Self {
        Self {
            method: method.into().to_ascii_uppercase(),
            url,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new("GET", url)
    }

    pub fn is_get(&self) -> bool {
        self.method == "GET"
    }

    /// blake3 of `METHOD|url`, the key entries are stored under.
    pub fn cache_key(&self) -> [u8; 32] {
        let input = format!("{}|{}", self.method, self.url.as_str());
        *blake3::hash(input.as_bytes()).as_bytes()
    }
}

/// Response snapshot as stored in a cache partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CachedResponse {
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResponseSource {
    StaticCache,
    Network,
    CacheFallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyResponse {
    pub response: CachedResponse,
    pub source: ResponseSource,
}

/// Outcome of offering a request to the proxy.
#[derive(Debug)]
pub enum FetchDecision {
    /// Not intercepted; the caller goes to the network itself.
    Passthrough,
    Respond(Result<ProxyResponse, ProxyError>),
}

#[derive(Debug)]
pub enum ProxyError {
    Network(NetworkError),
    Install { url: String, reason: String },
    /// Network failed and no partition holds the request.
    Offline { url: String },
    Storage(StorageError),
    InvalidTransition(String),
    Manifest(ManifestError),
}

impl std::fmt::Display for ProxyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProxyError::Network(e) => write!(f, "{e}"),
            ProxyError::Install { url, reason } => {
                write!(f, "app-shell install failed at {url}: {reason}")
            }
            ProxyError::Offline { url } => write!(f, "offline and not cached: {url}"),
            ProxyError::Storage(e) => write!(f, "{e}"),
            ProxyError::InvalidTransition(msg) => write!(f, "{msg}"),
            ProxyError::Manifest(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ProxyError {}

impl From<NetworkError> for ProxyError {
    fn from(e: NetworkError) -> Self {
        ProxyError::Network(e)
    }
}

impl From<StorageError> for ProxyError {
    fn from(e: StorageError) -> Self {
        ProxyError::Storage(e)
    }
}

impl From<ManifestError> for ProxyError {
    fn from(e: ManifestError) -> Self {
        ProxyError::Manifest(e)
    }
}

/// Versioned partition names, fixed at deploy time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNames {
    pub static_name: String,
    pub dynamic_name: String,
}

impl CacheNames {
    pub fn new(static_tag: &str, dynamic_tag: &str) -> Self {
        Self {
            static_name: format!("static-{static_tag}"),
            dynamic_name: format!("dynamic-{dynamic_tag}"),
        }
    }

    pub fn is_current(&self, name: &str) -> bool {
        name == self.static_name || name == self.dynamic_name
    }
}

impl Default for CacheNames {
    fn default() -> Self {
        Self::new("v1", "v1")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivationReport {
    pub deleted: Vec<String>,
    pub retained: Vec<String>,
    pub claimed: bool,
}

/// How `register` brought the proxy under control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Installed(ActivationReport),
    /// Install failed; a previous installation of the same static partition
    /// took over.
    Adopted { install_error: String },
}

pub struct CacheProxy {
    names: CacheNames,
    shell: AppShell,
    network: Arc<dyn Network>,
    storage: Arc<dyn CacheStorage>,
    state: WorkerStateMachine,
    metrics: Arc<MetricsRegistry>,
}

impl CacheProxy {
    pub fn new(
        names: CacheNames,
        shell: AppShell,
        network: Arc<dyn Network>,
        storage: Arc<dyn CacheStorage>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            names,
            shell,
            network,
            storage,
            state: WorkerStateMachine::new(),
            metrics,
        }
    }

    pub fn names(&self) -> &CacheNames {
        &self.names
    }

    pub fn shell(&self) -> &AppShell {
        &self.shell
    }

    pub fn state(&self) -> WorkerState {
        self.state.current()
    }

    pub fn worker(&self) -> &WorkerStateMachine {
        &self.state
    }

    fn transition(&self, next: WorkerState) -> Result<WorkerState, ProxyError> {
        self.state.transition(next).map_err(ProxyError::InvalidTransition)
    }

    /// Fetch every app-shell asset, then store them all at once.
    /// Any transport error or non-2xx status leaves the static partition
    /// untouched and makes this worker Redundant.
    pub async fn install(&self) -> Result<usize, ProxyError> {
        self.transition(WorkerState::Installing)?;
        let span = self.metrics.span(metric_names::PROXY_INSTALL);

        let fetches = self.shell.urls().iter().map(|url| {
            let request = Request::get(url.clone());
            async move {
                let response = self
                    .network
                    .fetch(&request)
                    .await
                    .map_err(|e| ProxyError::Install {
                        url: request.url.to_string(),
                        reason: e.to_string(),
                    })?;
                if !response.is_ok() {
                    return Err(ProxyError::Install {
                        url: request.url.to_string(),
                        reason: format!("HTTP {}", response.status),
                    });
                }
                Ok::<_, ProxyError>((request, response))
            }
        });

        let stored = match try_join_all(fetches).await {
            Ok(entries) => self
                .storage
                .put_all(&self.names.static_name, &entries)
                .map(|()| entries.len())
                .map_err(ProxyError::from),
            Err(e) => Err(e),
        };
        span.finish();

        match stored {
            Ok(count) => {
                self.transition(WorkerState::Installed)?;
                info!(partition = %self.names.static_name, assets = count, "app shell installed");
                Ok(count)
            }
            Err(e) => {
                warn!(error = %e, "app shell install failed");
                self.transition(WorkerState::Redundant)?;
                Err(e)
            }
        }
    }

    /// Delete every partition that is not current, then claim clients.
    pub async fn activate(&self) -> Result<ActivationReport, ProxyError> {
        self.transition(WorkerState::Activating)?;

        let mut deleted = Vec::new();
        let mut retained = Vec::new();
        for name in self.storage.keys()? {
            if self.names.is_current(&name) {
                retained.push(name);
            } else if self.storage.delete(&name)? {
                deleted.push(name);
            }
        }

        self.transition(WorkerState::Activated)?;
        info!(deleted = ?deleted, retained = ?retained, "proxy activated");
        Ok(ActivationReport {
            deleted,
            retained,
            claimed: true,
        })
    }

    /// Install and activate. When install fails but the current static
    /// partition already holds assets from an earlier run, that installation
    /// keeps serving.
    pub async fn register(&self) -> Result<Registration, ProxyError> {
        match self.install().await {
            Ok(_) => Ok(Registration::Installed(self.activate().await?)),
            Err(install_error) => {
                let previous = self.storage.has(&self.names.static_name)?
                    && self.storage.entry_count(&self.names.static_name)? > 0;
                if !previous {
                    return Err(install_error);
                }
                self.transition(WorkerState::Activated)?;
                info!(
                    partition = %self.names.static_name,
                    error = %install_error,
                    "previous app shell adopted"
                );
                Ok(Registration::Adopted {
                    install_error: install_error.to_string(),
                })
            }
        }
    }

    /// Offer a request for interception. Only GETs are intercepted, and only
    /// once the worker is activated.
    pub async fn handle_fetch(&self, request: &Request) -> FetchDecision {
        if !request.is_get() || !self.state.current().is_controlling() {
            return FetchDecision::Passthrough;
        }
        FetchDecision::Respond(self.fetch(request).await)
    }

    /// Answer an intercepted request.
    pub async fn fetch(&self, request: &Request) -> Result<ProxyResponse, ProxyError> {
        let fetch_id = FetchId::new();
        let span = self.metrics.span(metric_names::PROXY_FETCH);
        let result = if self.shell.contains(&request.url) {
            self.cache_first(request).await
        } else {
            self.network_first(request).await
        };
        span.finish();

        match &result {
            Ok(answer) => debug!(
                %fetch_id,
                url = %request.url,
                source = ?answer.source,
                status = answer.response.status,
                "proxy fetch"
            ),
            Err(e) => debug!(
                %fetch_id,
                url = %request.url,
                error = %e,
                "proxy fetch failed"
            ),
        }
        result
    }

    /// Intercept when possible, else go straight to the network.
    pub async fn respond(&self, request: &Request) -> Result<ProxyResponse, ProxyError> {
        match self.handle_fetch(request).await {
            FetchDecision::Respond(result) => result,
            FetchDecision::Passthrough => Ok(ProxyResponse {
                response: self.network.fetch(request).await?,
                source: ResponseSource::Network,
            }),
        }
    }

    // A miss is fetched live and returned without touching any partition.
    async fn cache_first(&self, request: &Request) -> Result<ProxyResponse, ProxyError> {
        if let Some(response) = self.storage.match_any(request)? {
            return Ok(ProxyResponse {
                response,
                source: ResponseSource::StaticCache,
            });
        }
        Ok(ProxyResponse {
            response: self.network.fetch(request).await?,
            source: ResponseSource::Network,
        })
    }

    async fn network_first(&self, request: &Request) -> Result<ProxyResponse, ProxyError> {
        match self.network.fetch(request).await {
            Ok(response) => {
                if let Err(e) = self.storage.put(&self.names.dynamic_name, request, &response) {
                    warn!(url = %request.url, error = %e, "dynamic cache put failed");
                }
                Ok(ProxyResponse {
                    response,
                    source: ResponseSource::Network,
                })
            }
            Err(network_error) => match self.storage.match_any(request)? {
                Some(response) => {
                    debug!(url = %request.url, error = %network_error, "served from cache");
                    Ok(ProxyResponse {
                        response,
                        source: ResponseSource::CacheFallback,
                    })
                }
                None => Err(ProxyError::Offline {
                    url: request.url.to_string(),
                }),
            },
        }
    }
}
