//! Runtime configuration: optional JSON file, then `PHRASEBOOK_*` environment
//! overrides, then defaults. Bad input is logged and skipped.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::offline::manifest::{AppShell, ManifestError};
use crate::offline::CacheNames;

pub const ENV_PREFIX: &str = "PHRASEBOOK_";

/// URI scheme the desktop webview loads the app from.
pub const APP_SCHEME: &str = "phrasebook";
/// Origin of the frontend compiled into the binary. Requests under it are
/// answered from the bundled assets rather than over HTTP.
pub const APP_ORIGIN: &str = "phrasebook://localhost/";

pub const DEFAULT_APP_SHELL: [&str; 7] = [
    "/",
    "/index.html",
    "/shell.js",
    "/data/phrases.json",
    "/manifest.webmanifest",
    "/icons/icon-192.png",
    "/icons/icon-512.png",
];

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    InvalidValue { key: String, value: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "config IO error: {e}"),
            ConfigError::Parse(e) => write!(f, "config parse error: {e}"),
            ConfigError::InvalidValue { key, value } => {
                write!(f, "invalid value for {key}: {value:?}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Where the store, cache and preference files live. The desktop shell
    /// fills this from the platform app-data directory when unset.
    pub data_dir: Option<PathBuf>,
    /// Deployment root the app shell is fetched from. Defaults to
    /// [`APP_ORIGIN`]; point it at an HTTP server to install from there.
    pub origin_url: String,
    pub static_cache_tag: String,
    pub dynamic_cache_tag: String,
    pub app_shell: Vec<String>,
    pub bundle_path: String,
    pub http_timeout_secs: u64,
    /// Entries held in the in-memory tier in front of the SQLite cache.
    pub response_memo_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            origin_url: APP_ORIGIN.to_string(),
            static_cache_tag: "v1".to_string(),
            dynamic_cache_tag: "v1".to_string(),
            app_shell: DEFAULT_APP_SHELL.iter().map(|p| p.to_string()).collect(),
            bundle_path: "/data/phrases.json".to_string(),
            http_timeout_secs: 10,
            response_memo_capacity: 128,
        }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// File (if any), then process environment. Never fails.
    pub fn load(path: Option<&Path>) -> Self {
        let mut config = match path {
            Some(path) => Self::load_from_file(path).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "config load failed, using defaults");
                Self::default()
            }),
            None => Self::default(),
        };
        config.apply_env();
        info!(origin = %config.origin_url, static_tag = %config.static_cache_tag, "config loaded");
        config
    }

    pub fn apply_env(&mut self) {
        for error in self.apply_overrides(|key| std::env::var(key).ok()) {
            warn!(error = %error, "ignoring environment override");
        }
    }

    /// Apply `PHRASEBOOK_*` overrides from `lookup`. Invalid values are
    /// skipped and returned.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Vec<ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));
        let mut errors = Vec::new();

        if let Some(dir) = var("DATA_DIR") {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(origin) = var("ORIGIN_URL") {
            self.origin_url = origin;
        }
        if let Some(tag) = var("STATIC_CACHE_TAG") {
            self.static_cache_tag = tag;
        }
        if let Some(tag) = var("DYNAMIC_CACHE_TAG") {
            self.dynamic_cache_tag = tag;
        }
        if let Some(list) = var("APP_SHELL") {
            self.app_shell = list
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(path) = var("BUNDLE_PATH") {
            self.bundle_path = path;
        }
        match parse_var(&var, "HTTP_TIMEOUT_SECS") {
            Ok(Some(secs)) => self.http_timeout_secs = secs,
            Ok(None) => {}
            Err(e) => errors.push(e),
        }
        match parse_var(&var, "RESPONSE_MEMO_CAPACITY") {
            Ok(Some(capacity)) => self.response_memo_capacity = capacity,
            Ok(None) => {}
            Err(e) => errors.push(e),
        }
        errors
    }

    /// Fill `data_dir` if neither the file nor the environment set it.
    pub fn with_default_data_dir(mut self, dir: PathBuf) -> Self {
        if self.data_dir.is_none() {
            self.data_dir = Some(dir);
        }
        self
    }

    pub fn data_dir(&self) -> &Path {
        self.data_dir
            .as_deref()
            .unwrap_or_else(|| Path::new("phrasebook-data"))
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir().join("phrasebook.sqlite3")
    }

    pub fn cache_path(&self) -> PathBuf {
        self.data_dir().join("offline-cache.sqlite3")
    }

    pub fn prefs_path(&self) -> PathBuf {
        self.data_dir().join("preferences.json")
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn cache_names(&self) -> CacheNames {
        CacheNames::new(&self.static_cache_tag, &self.dynamic_cache_tag)
    }

    pub fn app_shell(&self) -> Result<AppShell, ManifestError> {
        AppShell::new(&self.origin_url, self.app_shell.iter().cloned())
    }
}

fn parse_var<T, F>(var: &F, name: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: format!("{ENV_PREFIX}{name}"),
                value: raw,
            }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_shipped_layout() {
        let config = AppConfig::default();
        assert_eq!(config.cache_names(), CacheNames::new("v1", "v1"));
        assert_eq!(config.app_shell.len(), 7);
        let shell = config.app_shell().unwrap();
        assert_eq!(shell.urls()[1].as_str(), "phrasebook://localhost/index.html");
        assert_eq!(
            shell.resolve(&config.bundle_path).unwrap().as_str(),
            "phrasebook://localhost/data/phrases.json"
        );
    }

    #[test]
    fn file_fields_are_optional() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"static_cache_tag": "v2"}"#).unwrap();
        let config = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(config.static_cache_tag, "v2");
        assert_eq!(config.dynamic_cache_tag, "v1");
    }

    #[test]
    fn overrides_apply_and_bad_numbers_are_reported() {
        let env: HashMap<&str, &str> = [
            ("PHRASEBOOK_APP_SHELL", "/, /index.html ,"),
            ("PHRASEBOOK_HTTP_TIMEOUT_SECS", "soon"),
            ("PHRASEBOOK_RESPONSE_MEMO_CAPACITY", "16"),
            ("PHRASEBOOK_DATA_DIR", "/tmp/pb"),
        ]
        .into_iter()
        .collect();
        let mut config = AppConfig::default();
        let errors = config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.app_shell, vec!["/".to_string(), "/index.html".to_string()]);
        assert_eq!(config.response_memo_capacity, 16);
        assert_eq!(config.http_timeout_secs, 10);
        assert_eq!(errors.len(), 1);
        assert_eq!(config.store_path(), PathBuf::from("/tmp/pb/phrasebook.sqlite3"));
    }

    #[test]
    fn explicit_data_dir_wins_over_platform_default() {
        let config = AppConfig {
            data_dir: Some(PathBuf::from("/explicit")),
            ..AppConfig::default()
        }
        .with_default_data_dir(PathBuf::from("/platform"));
        assert_eq!(config.data_dir(), Path::new("/explicit"));
    }
}
