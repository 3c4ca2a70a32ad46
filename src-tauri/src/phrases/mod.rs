//! Phrase bundle: records, supported languages and display-text resolution.
//! Per-language fields follow `<lang>`, `<lang>Casual`, `<lang>Polite`,
//! `<lang>Pron`, `<lang>PronCasual`, `<lang>PronPolite`.

pub mod tokenize;

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

/// Shown when neither the styled nor the generic target text exists.
pub const PLACEHOLDER: &str = "—";

/// Speech register a card row is rendered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Style {
    Casual,
    Polite,
}

impl Style {
    pub fn from_polite(polite: bool) -> Self {
        if polite {
            Style::Polite
        } else {
            Style::Casual
        }
    }

    fn text_suffix(self) -> &'static str {
        match self {
            Style::Casual => "Casual",
            Style::Polite => "Polite",
        }
    }

    fn pron_suffix(self) -> &'static str {
        match self {
            Style::Casual => "PronCasual",
            Style::Polite => "PronPolite",
        }
    }
}

/// A single phrase record as shipped in the bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phrase {
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub id: String,
    #[serde(default)]
    pub en: String,
    /// Every other field, keyed by its bundle name (`ja`, `jaPronPolite`, ...).
    #[serde(flatten)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl Phrase {
    /// Non-empty string field by name. Non-string values count as absent.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    /// Target text: styled field, then generic field, then [`PLACEHOLDER`].
    pub fn text(&self, lang: &str, style: Style) -> &str {
        self.field(&format!("{lang}{}", style.text_suffix()))
            .or_else(|| self.field(lang))
            .unwrap_or(PLACEHOLDER)
    }

    /// Pronunciation: styled field, then `<lang>Pron`, then the empty string.
    pub fn pronunciation(&self, lang: &str, style: Style) -> &str {
        self.field(&format!("{lang}{}", style.pron_suffix()))
            .or_else(|| self.field(&format!("{lang}Pron")))
            .unwrap_or("")
    }

    /// True if the phrase carries polite text or polite pronunciation for `lang`.
    pub fn has_polite_variant(&self, lang: &str) -> bool {
        self.field(&format!("{lang}Polite")).is_some()
            || self.field(&format!("{lang}PronPolite")).is_some()
    }
}

/// Bundles may use integer ids; they are normalized to strings.
fn id_from_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedLanguage {
    pub code: String,
    pub label: String,
}

impl SupportedLanguage {
    pub fn new(code: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            label: label.into(),
        }
    }
}

/// On-disk / on-wire bundle format.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BundleFile {
    supported_languages: Vec<SupportedLanguage>,
    #[serde(default)]
    phrases: Vec<Phrase>,
}

#[derive(Debug)]
pub enum BundleError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    NoLanguages,
}

impl std::fmt::Display for BundleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BundleError::Io(e) => write!(f, "bundle IO error: {e}"),
            BundleError::Parse(e) => write!(f, "bundle parse error: {e}"),
            BundleError::NoLanguages => write!(f, "bundle declares no supported languages"),
        }
    }
}

impl std::error::Error for BundleError {}

impl From<std::io::Error> for BundleError {
    fn from(e: std::io::Error) -> Self {
        BundleError::Io(e)
    }
}

impl From<serde_json::Error> for BundleError {
    fn from(e: serde_json::Error) -> Self {
        BundleError::Parse(e)
    }
}

/// Loaded phrase list plus the languages it covers. Always has at least one language.
#[derive(Debug, Clone)]
pub struct PhraseBook {
    languages: Vec<SupportedLanguage>,
    phrases: Vec<Phrase>,
}

impl PhraseBook {
    pub fn new(
        languages: Vec<SupportedLanguage>,
        phrases: Vec<Phrase>,
    ) -> Result<Self, BundleError> {
        if languages.is_empty() {
            return Err(BundleError::NoLanguages);
        }
        Ok(Self { languages, phrases })
    }

    /// Parse a JSON bundle (`{"supportedLanguages": [...], "phrases": [...]}`).
    pub fn from_json(bytes: &[u8]) -> Result<Self, BundleError> {
        let file: BundleFile = serde_json::from_slice(bytes)?;
        Self::new(file.supported_languages, file.phrases)
    }

    pub fn load_from_file(path: &Path) -> Result<Self, BundleError> {
        let bytes = std::fs::read(path)?;
        Self::from_json(&bytes)
    }

    pub fn to_json(&self) -> Result<Vec<u8>, BundleError> {
        let file = BundleFile {
            supported_languages: self.languages.clone(),
            phrases: self.phrases.clone(),
        };
        Ok(serde_json::to_vec(&file)?)
    }

    pub fn languages(&self) -> &[SupportedLanguage] {
        &self.languages
    }

    pub fn phrases(&self) -> &[Phrase] {
        &self.phrases
    }

    pub fn default_language(&self) -> &SupportedLanguage {
        // `new` rejects empty language lists.
        &self.languages[0]
    }

    pub fn is_supported(&self, code: &str) -> bool {
        self.languages.iter().any(|l| l.code == code)
    }

    /// Display label for `code`, or the raw code if it is not a supported language.
    pub fn language_label<'a>(&'a self, code: &'a str) -> &'a str {
        self.languages
            .iter()
            .find(|l| l.code == code)
            .map(|l| l.label.as_str())
            .unwrap_or(code)
    }
}
