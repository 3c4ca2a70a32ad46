//! Named cache partitions holding response snapshots keyed by request identity.

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;

use super::{CachedResponse, Request};

#[derive(Debug)]
pub enum StorageError {
    Sqlite(rusqlite::Error),
    Encode(rmp_serde::encode::Error),
    Decode(rmp_serde::decode::Error),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Sqlite(e) => write!(f, "cache SQLite error: {e}"),
            StorageError::Encode(e) => write!(f, "cache encode error: {e}"),
            StorageError::Decode(e) => write!(f, "cache decode error: {e}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        StorageError::Sqlite(e)
    }
}

impl From<rmp_serde::encode::Error> for StorageError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        StorageError::Encode(e)
    }
}

impl From<rmp_serde::decode::Error> for StorageError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        StorageError::Decode(e)
    }
}

/// Partitioned response cache.
pub trait CacheStorage: Send + Sync {
    /// Create the partition if missing.
    fn open(&self, name: &str) -> Result<(), StorageError>;
    /// Names of all existing partitions.
    fn keys(&self) -> Result<Vec<String>, StorageError>;
    fn has(&self, name: &str) -> Result<bool, StorageError>;
    /// Drop a partition and every entry in it. Returns false if it did not exist.
    fn delete(&self, name: &str) -> Result<bool, StorageError>;
    /// Upsert one entry, creating the partition if needed.
    fn put(&self, name: &str, request: &Request, response: &CachedResponse) -> Result<(), StorageError>;
    /// Store every entry or none of them.
    fn put_all(&self, name: &str, entries: &[(Request, CachedResponse)]) -> Result<(), StorageError>;
    fn match_in(&self, name: &str, request: &Request) -> Result<Option<CachedResponse>, StorageError>;
    /// First entry for `request` in any partition.
    fn match_any(&self, request: &Request) -> Result<Option<CachedResponse>, StorageError>;
    fn entry_count(&self, name: &str) -> Result<usize, StorageError>;
}

/// In-memory partitions.
#[derive(Default)]
pub struct MemoryCacheStorage {
    partitions: Mutex<BTreeMap<String, HashMap<[u8; 32], CachedResponse>>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStorage for MemoryCacheStorage {
    fn open(&self, name: &str) -> Result<(), StorageError> {
        self.partitions.lock().entry(name.to_string()).or_default();
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.partitions.lock().keys().cloned().collect())
    }

    fn has(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.partitions.lock().contains_key(name))
    }

    fn delete(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.partitions.lock().remove(name).is_some())
    }

    fn put(&self, name: &str, request: &Request, response: &CachedResponse) -> Result<(), StorageError> {
        self.partitions
            .lock()
            .entry(name.to_string())
            .or_default()
            .insert(request.cache_key(), response.clone());
        Ok(())
    }

    fn put_all(&self, name: &str, entries: &[(Request, CachedResponse)]) -> Result<(), StorageError> {
        let mut partitions = self.partitions.lock();
        let partition = partitions.entry(name.to_string()).or_default();
        for (request, response) in entries {
            partition.insert(request.cache_key(), response.clone());
        }
        Ok(())
    }

    fn match_in(&self, name: &str, request: &Request) -> Result<Option<CachedResponse>, StorageError> {
        Ok(self
            .partitions
            .lock()
            .get(name)
            .and_then(|p| p.get(&request.cache_key()))
            .cloned())
    }

    fn match_any(&self, request: &Request) -> Result<Option<CachedResponse>, StorageError> {
        let key = request.cache_key();
        Ok(self
            .partitions
            .lock()
            .values()
            .find_map(|p| p.get(&key).cloned()))
    }

    fn entry_count(&self, name: &str) -> Result<usize, StorageError> {
        Ok(self.partitions.lock().get(name).map(HashMap::len).unwrap_or(0))
    }
}
