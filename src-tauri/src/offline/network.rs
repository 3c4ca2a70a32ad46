//! Network access for the offline proxy.
//! Any HTTP response counts as success; only transport failures are errors.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use reqwest::Url;
use tracing::debug;

use super::manifest::same_origin;
use super::{CachedResponse, Request};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    Unreachable(String),
    Timeout,
    InvalidRequest(String),
}

impl std::fmt::Display for NetworkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkError::Unreachable(msg) => write!(f, "network unreachable: {msg}"),
            NetworkError::Timeout => write!(f, "network timeout"),
            NetworkError::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
        }
    }
}

impl std::error::Error for NetworkError {}

impl From<reqwest::Error> for NetworkError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            NetworkError::Timeout
        } else {
            NetworkError::Unreachable(e.to_string())
        }
    }
}

/// Network adapter (reqwest in production, scripted fakes in tests).
pub trait Network: Send + Sync {
    fn fetch<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<CachedResponse, NetworkError>>;
}

/// reqwest-backed network with connection pooling.
pub struct HttpNetwork {
    http: reqwest::Client,
}

impl HttpNetwork {
    pub fn new(timeout: Duration) -> Result<Self, NetworkError> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(timeout)
            .build()
            .map_err(|e| NetworkError::InvalidRequest(e.to_string()))?;
        Ok(Self { http })
    }
}

impl Network for HttpNetwork {
    fn fetch<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<CachedResponse, NetworkError>> {
        Box::pin(async move {
            let method = reqwest::Method::from_bytes(request.method.as_bytes())
                .map_err(|e| NetworkError::InvalidRequest(e.to_string()))?;

            let response = self
                .http
                .request(method, request.url.clone())
                .send()
                .await?;

            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect();
            let body = response.bytes().await?.to_vec();

            debug!(url = %request.url, status, bytes = body.len(), "network fetch complete");
            Ok::<_, NetworkError>(CachedResponse {
                status,
                headers,
                body,
            })
        })
    }
}

/// Sends requests for one origin to `local` and everything else to
/// `remote`. The desktop shell routes its own scheme to the bundled
/// frontend this way, so the app shell installs without a server.
pub struct OriginRouter {
    origin: Url,
    local: Arc<dyn Network>,
    remote: Arc<dyn Network>,
}

impl OriginRouter {
    pub fn new(origin: Url, local: Arc<dyn Network>, remote: Arc<dyn Network>) -> Self {
        Self {
            origin,
            local,
            remote,
        }
    }
}

impl Network for OriginRouter {
    fn fetch<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<CachedResponse, NetworkError>> {
        if same_origin(&request.url, &self.origin) {
            self.local.fetch(request)
        } else {
            self.remote.fetch(request)
        }
    }
}
