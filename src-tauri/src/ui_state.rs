//! UI state owner: immutable snapshots, validated updates, and a watch channel
//! for subscribers. `dropdown_open` is view-only and never persisted.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::phrases::PhraseBook;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiState {
    pub target_language: String,
    pub show_polite: bool,
    pub dropdown_open: bool,
}

impl UiState {
    pub fn new(target_language: impl Into<String>, show_polite: bool) -> Self {
        Self {
            target_language: target_language.into(),
            show_polite,
            dropdown_open: false,
        }
    }

    /// Pure transition. Rejects languages the book does not support and leaves
    /// the state untouched in that case.
    pub fn apply(&self, action: &UiAction, book: &PhraseBook) -> Result<UiState, UiStateError> {
        let mut next = self.clone();
        match action {
            UiAction::ToggleDropdown => next.dropdown_open = !self.dropdown_open,
            UiAction::SelectLanguage(code) => {
                if !book.is_supported(code) {
                    return Err(UiStateError::UnsupportedLanguage(code.clone()));
                }
                next.target_language = code.clone();
                next.dropdown_open = false;
            }
            UiAction::TogglePolite => next.show_polite = !self.show_polite,
            UiAction::Dismiss => next.dropdown_open = false,
        }
        Ok(next)
    }

    pub fn persisted(&self) -> PersistedUiState {
        PersistedUiState {
            target_language: Some(self.target_language.clone()),
            show_polite: Some(self.show_polite),
        }
    }
}

/// The stored `"ui"` blob. Both fields are optional so partial or foreign
/// blobs restore what they can.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedUiState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_polite: Option<bool>,
}

/// User intents carried by interactive view nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "code", rename_all = "snake_case")]
pub enum UiAction {
    ToggleDropdown,
    SelectLanguage(String),
    TogglePolite,
    Dismiss,
}

impl UiAction {
    pub fn name(&self) -> &'static str {
        match self {
            UiAction::ToggleDropdown => "toggle_dropdown",
            UiAction::SelectLanguage(_) => "select_language",
            UiAction::TogglePolite => "toggle_polite",
            UiAction::Dismiss => "dismiss",
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            UiAction::SelectLanguage(code) => Some(code),
            _ => None,
        }
    }

    /// Inverse of [`UiAction::name`] / [`UiAction::code`], used by the webview bridge.
    pub fn from_parts(name: &str, code: Option<&str>) -> Option<Self> {
        match (name, code) {
            ("toggle_dropdown", _) => Some(UiAction::ToggleDropdown),
            ("select_language", Some(code)) => Some(UiAction::SelectLanguage(code.to_string())),
            ("toggle_polite", _) => Some(UiAction::TogglePolite),
            ("dismiss", _) => Some(UiAction::Dismiss),
            _ => None,
        }
    }

    /// Clicks on these land inside the language selector and must not dismiss it.
    pub fn is_inside_selector(&self) -> bool {
        matches!(self, UiAction::ToggleDropdown | UiAction::SelectLanguage(_))
    }

    /// Whether applying this action changes persisted preferences.
    pub fn persists(&self) -> bool {
        matches!(self, UiAction::SelectLanguage(_) | UiAction::TogglePolite)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiStateError {
    UnsupportedLanguage(String),
}

impl std::fmt::Display for UiStateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UiStateError::UnsupportedLanguage(code) => write!(f, "unsupported language: {code}"),
        }
    }
}

impl std::error::Error for UiStateError {}

/// Single owner of the live UI state.
pub struct StateOwner {
    state: RwLock<UiState>,
    state_tx: watch::Sender<UiState>,
    state_rx: watch::Receiver<UiState>,
}

impl StateOwner {
    pub fn new(initial: UiState) -> Self {
        let (state_tx, state_rx) = watch::channel(initial.clone());
        Self {
            state: RwLock::new(initial),
            state_tx,
            state_rx,
        }
    }

    /// Current snapshot.
    pub fn current(&self) -> UiState {
        self.state.read().clone()
    }

    /// Apply an action and publish the new snapshot.
    pub fn apply(&self, action: &UiAction, book: &PhraseBook) -> Result<UiState, UiStateError> {
        let mut state = self.state.write();
        let next = state.apply(action, book)?;
        *state = next.clone();
        let _ = self.state_tx.send(next.clone());
        debug!(action = action.name(), language = %next.target_language, polite = next.show_polite, "ui_action_applied");
        Ok(next)
    }

    /// Overlay restored fields. Unsupported languages are skipped.
    pub fn restore(&self, persisted: &PersistedUiState, book: &PhraseBook) -> UiState {
        let mut state = self.state.write();
        let mut next = state.clone();
        if let Some(code) = &persisted.target_language {
            if book.is_supported(code) {
                next.target_language = code.clone();
            } else {
                info!(language = %code, "ignoring restored unsupported language");
            }
        }
        if let Some(polite) = persisted.show_polite {
            next.show_polite = polite;
        }
        *state = next.clone();
        let _ = self.state_tx.send(next.clone());
        next
    }

    pub fn subscribe(&self) -> watch::Receiver<UiState> {
        self.state_rx.clone()
    }
}
