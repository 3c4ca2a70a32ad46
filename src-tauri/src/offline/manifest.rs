//! App-shell manifest: the root-relative asset paths precached at install.
//! Paths resolve against the deployment scope, so an app served from
//! `https://host/phrasebook/` precaches `https://host/phrasebook/index.html`.

use reqwest::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    InvalidScope(String),
    InvalidPath { path: String, reason: String },
}

impl std::fmt::Display for ManifestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManifestError::InvalidScope(msg) => write!(f, "invalid deployment scope: {msg}"),
            ManifestError::InvalidPath { path, reason } => {
                write!(f, "invalid app-shell path {path}: {reason}")
            }
        }
    }
}

impl std::error::Error for ManifestError {}

#[derive(Debug, Clone)]
pub struct AppShell {
    scope: Url,
    paths: Vec<String>,
    urls: Vec<Url>,
}

impl AppShell {
    /// `scope` is the deployment root; a missing trailing slash is added.
    pub fn new<I, S>(scope: &str, paths: I) -> Result<Self, ManifestError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut scope =
            Url::parse(scope).map_err(|e| ManifestError::InvalidScope(format!("{scope}: {e}")))?;
        if !scope.path().ends_with('/') {
            let path = format!("{}/", scope.path());
            scope.set_path(&path);
        }
        scope.set_query(None);
        scope.set_fragment(None);

        let mut normalized = Vec::new();
        let mut urls = Vec::new();
        for path in paths {
            let path: String = path.into();
            let rooted = format!("/{}", path.trim_start_matches('/'));
            let url = scope
                .join(rooted.trim_start_matches('/'))
                .map_err(|e| ManifestError::InvalidPath {
                    path: rooted.clone(),
                    reason: e.to_string(),
                })?;
            normalized.push(rooted);
            urls.push(url);
        }

        Ok(Self {
            scope,
            paths: normalized,
            urls,
        })
    }

    pub fn scope(&self) -> &Url {
        &self.scope
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    /// Absolute URLs of every shell asset, in manifest order.
    pub fn urls(&self) -> &[Url] {
        &self.urls
    }

    /// Resolve a root-relative path (`/data/phrases.json`) inside the scope.
    pub fn resolve(&self, path: &str) -> Result<Url, ManifestError> {
        self.scope
            .join(path.trim_start_matches('/'))
            .map_err(|e| ManifestError::InvalidPath {
                path: path.to_string(),
                reason: e.to_string(),
            })
    }

    /// Root-relative path of `url` within the scope, or None for foreign URLs.
    /// Query and fragment are ignored.
    pub fn shell_path(&self, url: &Url) -> Option<String> {
        if !same_origin(url, &self.scope) {
            return None;
        }
        url.path()
            .strip_prefix(self.scope.path())
            .map(|rest| format!("/{rest}"))
    }

    /// Exact path match against the manifest.
    pub fn contains(&self, url: &Url) -> bool {
        self.shell_path(url)
            .map(|path| self.paths.iter().any(|p| *p == path))
            .unwrap_or(false)
    }
}

/// Scheme, host and port all match. `Url::origin` cannot be used here: it
/// is opaque for custom schemes, so `phrasebook://localhost/` would never
/// equal itself.
pub fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str() == b.host_str()
        && a.port_or_known_default() == b.port_or_known_default()
}
