//! Preference mirror: synchronous `targetLanguage` / `showPolite` settings.
//! Read before the async store restore completes; written alongside every
//! store write so a quick reload sees the latest values.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::diagnostics::{Diagnostics, Operation};
use crate::ui_state::UiState;

pub const TARGET_LANGUAGE_KEY: &str = "targetLanguage";
pub const SHOW_POLITE_KEY: &str = "showPolite";

#[derive(Debug)]
pub enum PrefsError {
    Io(std::io::Error),
    Serialize(serde_json::Error),
}

impl std::fmt::Display for PrefsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrefsError::Io(e) => write!(f, "preferences IO error: {e}"),
            PrefsError::Serialize(e) => write!(f, "preferences serialization error: {e}"),
        }
    }
}

impl std::error::Error for PrefsError {}

impl From<std::io::Error> for PrefsError {
    fn from(e: std::io::Error) -> Self {
        PrefsError::Io(e)
    }
}

impl From<serde_json::Error> for PrefsError {
    fn from(e: serde_json::Error) -> Self {
        PrefsError::Serialize(e)
    }
}

/// Durable string key-value storage.
pub trait PreferenceBackend: Send + Sync {
    fn get_item(&self, key: &str) -> Option<String>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), PrefsError>;
}

#[derive(Default)]
pub struct MemoryPreferences {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceBackend for MemoryPreferences {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.lock().get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), PrefsError> {
        self.items.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// JSON file rewritten in full on every set (temp file + rename).
pub struct FilePreferences {
    path: PathBuf,
    items: Mutex<BTreeMap<String, String>>,
}

impl FilePreferences {
    /// Open the preferences file. A missing file starts empty; an unreadable
    /// one is logged and also starts empty.
    pub fn open(path: &Path) -> Self {
        let items = match std::fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "preferences file corrupt, starting empty");
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "preferences file unreadable, starting empty");
                BTreeMap::new()
            }
        };
        info!(path = %path.display(), keys = items.len(), "preferences opened");
        Self {
            path: path.to_path_buf(),
            items: Mutex::new(items),
        }
    }

    fn write_file(&self, items: &BTreeMap<String, String>) -> Result<(), PrefsError> {
        let bytes = serde_json::to_vec_pretty(items)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl PreferenceBackend for FilePreferences {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.lock().get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), PrefsError> {
        let mut items = self.items.lock();
        items.insert(key.to_string(), value.to_string());
        self.write_file(&items)
    }
}

/// Typed view over a [`PreferenceBackend`]. Writes never fail the caller.
#[derive(Clone)]
pub struct PreferenceMirror {
    backend: Arc<dyn PreferenceBackend>,
    diagnostics: Arc<dyn Diagnostics>,
}

impl PreferenceMirror {
    pub fn new(backend: Arc<dyn PreferenceBackend>, diagnostics: Arc<dyn Diagnostics>) -> Self {
        Self {
            backend,
            diagnostics,
        }
    }

    pub fn target_language(&self) -> Option<String> {
        self.backend.get_item(TARGET_LANGUAGE_KEY)
    }

    /// Stored as `"1"` / `"0"`; anything else reads as off.
    pub fn show_polite(&self) -> bool {
        self.backend.get_item(SHOW_POLITE_KEY).as_deref() == Some("1")
    }

    pub fn set_target_language(&self, code: &str) {
        self.set(TARGET_LANGUAGE_KEY, code);
    }

    pub fn set_show_polite(&self, polite: bool) {
        self.set(SHOW_POLITE_KEY, if polite { "1" } else { "0" });
    }

    pub fn write_state(&self, state: &UiState) {
        self.set_target_language(&state.target_language);
        self.set_show_polite(state.show_polite);
    }

    fn set(&self, key: &str, value: &str) {
        if let Err(e) = self.backend.set_item(key, value) {
            self.diagnostics
                .best_effort_failed(Operation::WritePreference, &e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::RecordingDiagnostics;

    struct ReadOnly;

    impl PreferenceBackend for ReadOnly {
        fn get_item(&self, _key: &str) -> Option<String> {
            None
        }

        fn set_item(&self, _key: &str, _value: &str) -> Result<(), PrefsError> {
            Err(PrefsError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            )))
        }
    }

    #[test]
    fn polite_flag_uses_digit_encoding() {
        let backend = Arc::new(MemoryPreferences::new());
        let mirror = PreferenceMirror::new(backend.clone(), Arc::new(RecordingDiagnostics::new()));
        assert!(!mirror.show_polite());
        mirror.set_show_polite(true);
        assert_eq!(backend.get_item(SHOW_POLITE_KEY).as_deref(), Some("1"));
        assert!(mirror.show_polite());
        mirror.set_show_polite(false);
        assert_eq!(backend.get_item(SHOW_POLITE_KEY).as_deref(), Some("0"));
    }

    #[test]
    fn file_backend_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.json");
        {
            let prefs = FilePreferences::open(&path);
            prefs.set_item(TARGET_LANGUAGE_KEY, "ko").unwrap();
        }
        let reopened = FilePreferences::open(&path);
        assert_eq!(reopened.get_item(TARGET_LANGUAGE_KEY).as_deref(), Some("ko"));
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.json");
        std::fs::write(&path, b"{not json").unwrap();
        let prefs = FilePreferences::open(&path);
        assert_eq!(prefs.get_item(TARGET_LANGUAGE_KEY), None);
    }

    #[test]
    fn write_failures_are_reported_not_raised() {
        let diagnostics = Arc::new(RecordingDiagnostics::new());
        let mirror = PreferenceMirror::new(Arc::new(ReadOnly), diagnostics.clone());
        mirror.write_state(&UiState::new("ja", true));
        assert_eq!(diagnostics.count(Operation::WritePreference), 2);
    }
}
