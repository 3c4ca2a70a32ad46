//! Key-value store with two partitions: `phrases` (keyed by phrase id) and
//! `state` (singleton key `"ui"`). Backends are synchronous; [`KvStore`]
//! moves every call onto the blocking pool so callers only ever await.

pub mod memory;
pub mod sqlite;
pub mod writer;

use std::sync::Arc;

use futures_util::future::join_all;
use tracing::debug;

use crate::phrases::Phrase;
use crate::ui_state::PersistedUiState;

/// Bump together with the table creation in [`sqlite::SqliteRecordStore`].
pub const SCHEMA_VERSION: u32 = 1;
pub const UI_STATE_KEY: &str = "ui";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Partition {
    Phrases,
    State,
}

impl Partition {
    pub const ALL: [Partition; 2] = [Partition::Phrases, Partition::State];

    pub fn name(self) -> &'static str {
        match self {
            Partition::Phrases => "phrases",
            Partition::State => "state",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub key: String,
    pub value: serde_json::Value,
}

impl Record {
    pub fn new(key: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

#[derive(Debug)]
pub enum StoreError {
    Unavailable(String),
    Sqlite(rusqlite::Error),
    Serialization(serde_json::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Unavailable(msg) => write!(f, "store unavailable: {msg}"),
            StoreError::Sqlite(e) => write!(f, "store SQLite error: {e}"),
            StoreError::Serialization(e) => write!(f, "store serialization error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Sqlite(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e)
    }
}

/// Storage backend. Each call is its own atomic operation.
pub trait RecordStore: Send + Sync {
    /// Upsert, replacing any record with the same key.
    fn put(&self, partition: Partition, record: Record) -> Result<(), StoreError>;
    fn get(&self, partition: Partition, key: &str) -> Result<Option<Record>, StoreError>;
    /// All records of a partition, in no particular order.
    fn get_all(&self, partition: Partition) -> Result<Vec<Record>, StoreError>;
}

/// Async facade over a [`RecordStore`].
#[derive(Clone)]
pub struct KvStore {
    backend: Arc<dyn RecordStore>,
}

impl KvStore {
    pub fn new(backend: Arc<dyn RecordStore>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(memory::MemoryRecordStore::new()))
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn RecordStore) -> Result<T, StoreError> + Send + 'static,
    {
        let backend = Arc::clone(&self.backend);
        tokio::task::spawn_blocking(move || op(backend.as_ref()))
            .await
            .map_err(|e| StoreError::Unavailable(format!("store task failed: {e}")))?
    }

    pub async fn put(&self, partition: Partition, record: Record) -> Result<(), StoreError> {
        self.blocking(move |store| store.put(partition, record)).await
    }

    pub async fn get(&self, partition: Partition, key: &str) -> Result<Option<Record>, StoreError> {
        let key = key.to_string();
        self.blocking(move |store| store.get(partition, &key)).await
    }

    pub async fn get_all(&self, partition: Partition) -> Result<Vec<Record>, StoreError> {
        self.blocking(move |store| store.get_all(partition)).await
    }

    /// Upsert every phrase, each as its own write. All writes are attempted;
    /// the first failure is returned.
    pub async fn put_phrases(&self, phrases: &[Phrase]) -> Result<usize, StoreError> {
        let mut records = Vec::with_capacity(phrases.len());
        for phrase in phrases {
            records.push(Record::new(phrase.id.clone(), serde_json::to_value(phrase)?));
        }
        let count = records.len();
        let results = join_all(
            records
                .into_iter()
                .map(|record| self.put(Partition::Phrases, record)),
        )
        .await;
        results.into_iter().collect::<Result<Vec<()>, _>>()?;
        debug!(count, "phrases mirrored");
        Ok(count)
    }

    /// Phrases mirrored by earlier runs. Records that no longer parse are skipped.
    pub async fn phrases(&self) -> Result<Vec<Phrase>, StoreError> {
        let records = self.get_all(Partition::Phrases).await?;
        Ok(records
            .into_iter()
            .filter_map(|r| serde_json::from_value(r.value).ok())
            .collect())
    }

    /// Stored UI state, read field by field. A field of the wrong type is
    /// skipped without discarding its siblings; a non-object blob reads as
    /// nothing stored.
    pub async fn load_ui_state(&self) -> Result<Option<PersistedUiState>, StoreError> {
        let Some(record) = self.get(Partition::State, UI_STATE_KEY).await? else {
            return Ok(None);
        };
        let Some(blob) = record.value.as_object() else {
            debug!("stored ui state is not an object, ignoring");
            return Ok(None);
        };
        Ok(Some(PersistedUiState {
            target_language: blob
                .get("targetLanguage")
                .and_then(|v| v.as_str())
                .map(str::to_owned),
            show_polite: blob.get("showPolite").and_then(|v| v.as_bool()),
        }))
    }

    /// Merge `partial` over the stored blob and write it back. Keys this
    /// version does not know about are kept.
    pub async fn save_ui_state(&self, partial: &PersistedUiState) -> Result<(), StoreError> {
        let existing = self
            .get(Partition::State, UI_STATE_KEY)
            .await?
            .map(|r| r.value)
            .filter(|v| v.is_object())
            .unwrap_or_else(|| serde_json::json!({}));

        let mut merged = existing;
        if let (Some(target), serde_json::Value::Object(update)) =
            (merged.as_object_mut(), serde_json::to_value(partial)?)
        {
            target.extend(update);
        }

        self.put(Partition::State, Record::new(UI_STATE_KEY, merged))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn put_replaces_by_key() {
        let store = KvStore::in_memory();
        store
            .put(Partition::Phrases, Record::new("a", serde_json::json!({"v": 1})))
            .await
            .unwrap();
        store
            .put(Partition::Phrases, Record::new("a", serde_json::json!({"v": 2})))
            .await
            .unwrap();
        let all = store.get_all(Partition::Phrases).await.unwrap();
        assert_eq!(all, vec![Record::new("a", serde_json::json!({"v": 2}))]);
        assert_eq!(store.get(Partition::State, "a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn ui_state_save_merges_existing_blob() {
        let store = KvStore::in_memory();
        store
            .put(
                Partition::State,
                Record::new(UI_STATE_KEY, serde_json::json!({"theme": "dark", "showPolite": false})),
            )
            .await
            .unwrap();

        store
            .save_ui_state(&PersistedUiState {
                target_language: Some("ko".into()),
                show_polite: Some(true),
            })
            .await
            .unwrap();

        let raw = store.get(Partition::State, UI_STATE_KEY).await.unwrap().unwrap();
        assert_eq!(
            raw.value,
            serde_json::json!({"theme": "dark", "targetLanguage": "ko", "showPolite": true})
        );
    }

    #[tokio::test]
    async fn partial_save_keeps_other_field() {
        let store = KvStore::in_memory();
        store
            .save_ui_state(&PersistedUiState {
                target_language: Some("ja".into()),
                show_polite: Some(true),
            })
            .await
            .unwrap();
        store
            .save_ui_state(&PersistedUiState {
                target_language: Some("ko".into()),
                show_polite: None,
            })
            .await
            .unwrap();
        assert_eq!(
            store.load_ui_state().await.unwrap(),
            Some(PersistedUiState {
                target_language: Some("ko".into()),
                show_polite: Some(true),
            })
        );
    }

    #[tokio::test]
    async fn mistyped_field_does_not_hide_its_sibling() {
        let store = KvStore::in_memory();
        store
            .put(
                Partition::State,
                Record::new(
                    UI_STATE_KEY,
                    serde_json::json!({"targetLanguage": "ko", "showPolite": "1"}),
                ),
            )
            .await
            .unwrap();
        assert_eq!(
            store.load_ui_state().await.unwrap(),
            Some(PersistedUiState {
                target_language: Some("ko".into()),
                show_polite: None,
            })
        );

        store
            .put(
                Partition::State,
                Record::new(UI_STATE_KEY, serde_json::json!({"targetLanguage": 7, "showPolite": true})),
            )
            .await
            .unwrap();
        assert_eq!(
            store.load_ui_state().await.unwrap(),
            Some(PersistedUiState {
                target_language: None,
                show_polite: Some(true),
            })
        );
    }

    #[tokio::test]
    async fn non_object_ui_blob_reads_as_empty() {
        let store = KvStore::in_memory();
        store
            .put(Partition::State, Record::new(UI_STATE_KEY, serde_json::json!("ko")))
            .await
            .unwrap();
        assert_eq!(store.load_ui_state().await.unwrap(), None);
    }

    #[tokio::test]
    async fn phrases_round_trip_through_partition() {
        let store = KvStore::in_memory();
        let phrase: Phrase =
            serde_json::from_value(serde_json::json!({"id": 3, "en": "Hi", "ja": "やあ"})).unwrap();
        assert_eq!(store.put_phrases(std::slice::from_ref(&phrase)).await.unwrap(), 1);
        assert_eq!(store.phrases().await.unwrap(), vec![phrase]);
    }
}
