use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use reqwest::Url;

use phrasebook::metrics::MetricsRegistry;
use phrasebook::offline::manifest::AppShell;
use phrasebook::offline::network::{Network, NetworkError};
use phrasebook::offline::sqlite_storage::SqliteCacheStorage;
use phrasebook::offline::storage::{CacheStorage, MemoryCacheStorage};
use phrasebook::offline::worker_state::WorkerState;
use phrasebook::offline::{
    CacheNames, CachedResponse, CacheProxy, FetchDecision, ProxyError, Registration, Request,
    ResponseSource,
};

const ORIGIN: &str = "https://phrasebook.example/app/";

/// Serves any path with 200 unless told otherwise; counts calls per URL.
#[derive(Default)]
struct ScriptedNetwork {
    offline: Mutex<bool>,
    statuses: Mutex<HashMap<String, u16>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedNetwork {
    fn set_offline(&self, offline: bool) {
        *self.offline.lock() = offline;
    }

    fn set_status(&self, path: &str, status: u16) {
        self.statuses.lock().insert(url(path).to_string(), status);
    }

    fn calls(&self, path: &str) -> usize {
        self.calls
            .lock()
            .get(url(path).as_str())
            .copied()
            .unwrap_or(0)
    }
}

impl Network for ScriptedNetwork {
    fn fetch<'a>(
        &'a self,
        request: &'a Request,
    ) -> BoxFuture<'a, Result<CachedResponse, NetworkError>> {
        Box::pin(async move {
            *self
                .calls
                .lock()
                .entry(request.url.to_string())
                .or_default() += 1;
            if *self.offline.lock() {
                return Err(NetworkError::Unreachable("connection refused".into()));
            }
            let status = self
                .statuses
                .lock()
                .get(request.url.as_str())
                .copied()
                .unwrap_or(200);
            Ok(CachedResponse {
                status,
                headers: vec![("content-type".into(), "text/plain".into())],
                body: format!("body of {}", request.url.path()).into_bytes(),
            })
        })
    }
}

fn url(path: &str) -> Url {
    Url::parse(ORIGIN)
        .unwrap()
        .join(path.trim_start_matches('/'))
        .unwrap()
}

fn shell() -> AppShell {
    AppShell::new(ORIGIN, ["/", "/index.html", "/shell.js", "/data/phrases.json"]).unwrap()
}

fn proxy_with(
    network: Arc<ScriptedNetwork>,
    storage: Arc<dyn CacheStorage>,
    names: CacheNames,
) -> CacheProxy {
    CacheProxy::new(
        names,
        shell(),
        network,
        storage,
        Arc::new(MetricsRegistry::new()),
    )
}

#[tokio::test]
async fn shell_assets_are_served_from_cache_after_install() {
    let network = Arc::new(ScriptedNetwork::default());
    let storage = Arc::new(MemoryCacheStorage::new());
    let proxy = proxy_with(network.clone(), storage.clone(), CacheNames::default());

    let registration = proxy.register().await.unwrap();
    assert!(matches!(registration, Registration::Installed(_)));
    assert_eq!(proxy.state(), WorkerState::Activated);
    assert_eq!(storage.entry_count("static-v1").unwrap(), 4);
    assert_eq!(network.calls("/index.html"), 1);

    for _ in 0..3 {
        let answer = proxy.fetch(&Request::get(url("/index.html"))).await.unwrap();
        assert_eq!(answer.source, ResponseSource::StaticCache);
        assert_eq!(answer.response.body, b"body of /app/index.html".to_vec());
    }
    assert_eq!(network.calls("/index.html"), 1);

    network.set_offline(true);
    let root = proxy.fetch(&Request::get(url("/"))).await.unwrap();
    assert_eq!(root.source, ResponseSource::StaticCache);
}

#[tokio::test]
async fn uncached_shell_request_goes_live_without_caching() {
    let network = Arc::new(ScriptedNetwork::default());
    let storage = Arc::new(MemoryCacheStorage::new());
    let proxy = proxy_with(network.clone(), storage.clone(), CacheNames::default());
    proxy.register().await.unwrap();

    // Same shell path, different request identity.
    let busted = Request::get(url("/index.html?v=2"));
    let answer = proxy.fetch(&busted).await.unwrap();
    assert_eq!(answer.source, ResponseSource::Network);
    assert_eq!(storage.entry_count("static-v1").unwrap(), 4);
    assert_eq!(storage.entry_count("dynamic-v1").unwrap(), 0);

    network.set_offline(true);
    assert!(matches!(
        proxy.fetch(&busted).await,
        Err(ProxyError::Network(NetworkError::Unreachable(_)))
    ));
}

#[tokio::test]
async fn other_requests_are_network_first_with_cache_fallback() {
    let network = Arc::new(ScriptedNetwork::default());
    let storage = Arc::new(MemoryCacheStorage::new());
    let proxy = proxy_with(network.clone(), storage.clone(), CacheNames::default());
    proxy.register().await.unwrap();

    let extra = Request::get(url("/data/extra.json"));
    let first = proxy.fetch(&extra).await.unwrap();
    assert_eq!(first.source, ResponseSource::Network);
    assert_eq!(storage.entry_count("dynamic-v1").unwrap(), 1);

    let second = proxy.fetch(&extra).await.unwrap();
    assert_eq!(second.source, ResponseSource::Network);
    assert_eq!(network.calls("/data/extra.json"), 2);

    network.set_offline(true);
    let offline = proxy.fetch(&extra).await.unwrap();
    assert_eq!(offline.source, ResponseSource::CacheFallback);
    assert_eq!(offline.response, first.response);

    let missing = proxy.fetch(&Request::get(url("/never-seen"))).await;
    assert!(matches!(missing, Err(ProxyError::Offline { .. })));
}

#[tokio::test]
async fn error_statuses_still_count_as_network_success() {
    let network = Arc::new(ScriptedNetwork::default());
    let storage = Arc::new(MemoryCacheStorage::new());
    let proxy = proxy_with(network.clone(), storage.clone(), CacheNames::default());
    proxy.register().await.unwrap();

    network.set_status("/api/missing", 404);
    let answer = proxy.fetch(&Request::get(url("/api/missing"))).await.unwrap();
    assert_eq!(answer.response.status, 404);
    assert_eq!(answer.source, ResponseSource::Network);
}

#[tokio::test]
async fn install_is_all_or_nothing() {
    let network = Arc::new(ScriptedNetwork::default());
    network.set_status("/shell.js", 500);
    let storage = Arc::new(MemoryCacheStorage::new());
    let proxy = proxy_with(network.clone(), storage.clone(), CacheNames::default());

    let err = proxy.install().await.unwrap_err();
    assert!(matches!(err, ProxyError::Install { .. }));
    assert_eq!(proxy.state(), WorkerState::Redundant);
    assert!(!storage.has("static-v1").unwrap());

    let decision = proxy.handle_fetch(&Request::get(url("/index.html"))).await;
    assert!(matches!(decision, FetchDecision::Passthrough));
}

#[tokio::test]
async fn activation_deletes_every_stale_partition() {
    let network = Arc::new(ScriptedNetwork::default());
    let storage = Arc::new(MemoryCacheStorage::new());
    let stale = Request::get(url("/old.js"));
    let snapshot = CachedResponse {
        status: 200,
        headers: vec![],
        body: b"old".to_vec(),
    };
    for name in ["static-v0", "dynamic-v0", "thumbnails", "dynamic-v2"] {
        storage.put(name, &stale, &snapshot).unwrap();
    }

    let proxy = proxy_with(network, storage.clone(), CacheNames::new("v2", "v2"));
    let report = match proxy.register().await.unwrap() {
        Registration::Installed(report) => report,
        other => panic!("unexpected registration: {other:?}"),
    };

    let mut deleted = report.deleted.clone();
    deleted.sort();
    assert_eq!(deleted, vec!["dynamic-v0", "static-v0", "thumbnails"]);
    assert!(report.claimed);

    let mut remaining = storage.keys().unwrap();
    remaining.sort();
    assert_eq!(remaining, vec!["dynamic-v2", "static-v2"]);
}

#[tokio::test]
async fn post_requests_are_not_intercepted() {
    let network = Arc::new(ScriptedNetwork::default());
    let storage = Arc::new(MemoryCacheStorage::new());
    let proxy = proxy_with(network.clone(), storage.clone(), CacheNames::default());
    proxy.register().await.unwrap();

    let post = Request::new("POST", url("/api/feedback"));
    assert!(matches!(proxy.handle_fetch(&post).await, FetchDecision::Passthrough));

    let answer = proxy.respond(&post).await.unwrap();
    assert_eq!(answer.source, ResponseSource::Network);
    assert_eq!(storage.entry_count("dynamic-v1").unwrap(), 0);
}

#[tokio::test]
async fn sqlite_cache_survives_restart_while_offline() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("offline-cache.sqlite3");
    let network = Arc::new(ScriptedNetwork::default());

    {
        let storage = Arc::new(SqliteCacheStorage::open(&path, 16).unwrap());
        let proxy = proxy_with(network.clone(), storage, CacheNames::default());
        proxy.register().await.unwrap();
        proxy
            .fetch(&Request::get(url("/data/extra.json")))
            .await
            .unwrap();
    }

    network.set_offline(true);
    let storage = Arc::new(SqliteCacheStorage::open(&path, 16).unwrap());
    let proxy = proxy_with(network, storage, CacheNames::default());
    assert!(matches!(
        proxy.register().await.unwrap(),
        Registration::Adopted { .. }
    ));

    let shell_page = proxy.fetch(&Request::get(url("/"))).await.unwrap();
    assert_eq!(shell_page.source, ResponseSource::StaticCache);
    let extra = proxy
        .fetch(&Request::get(url("/data/extra.json")))
        .await
        .unwrap();
    assert_eq!(extra.source, ResponseSource::CacheFallback);
    assert_eq!(extra.response.body, b"body of /app/data/extra.json".to_vec());
}
