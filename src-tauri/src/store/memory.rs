//! In-memory record store. Used by tests and as the degraded fallback when
//! the database cannot be opened.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use super::{Partition, Record, RecordStore, StoreError};

pub struct MemoryRecordStore {
    partitions: Mutex<HashMap<Partition, BTreeMap<String, serde_json::Value>>>,
    available: AtomicBool,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self {
            partitions: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the store going away (every operation fails until re-enabled).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store disabled".into()))
        }
    }
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore for MemoryRecordStore {
    fn put(&self, partition: Partition, record: Record) -> Result<(), StoreError> {
        self.check()?;
        self.partitions
            .lock()
            .entry(partition)
            .or_default()
            .insert(record.key, record.value);
        Ok(())
    }

    fn get(&self, partition: Partition, key: &str) -> Result<Option<Record>, StoreError> {
        self.check()?;
        Ok(self
            .partitions
            .lock()
            .get(&partition)
            .and_then(|p| p.get(key))
            .map(|value| Record::new(key, value.clone())))
    }

    fn get_all(&self, partition: Partition) -> Result<Vec<Record>, StoreError> {
        self.check()?;
        Ok(self
            .partitions
            .lock()
            .get(&partition)
            .map(|p| {
                p.iter()
                    .map(|(k, v)| Record::new(k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }
}
