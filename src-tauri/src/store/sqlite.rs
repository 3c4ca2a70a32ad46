//! SQLite record store. One table per partition; schema versioned with
//! `PRAGMA user_version` so reopening an up-to-date database is a no-op.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use super::{Partition, Record, RecordStore, StoreError, SCHEMA_VERSION};

pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
}

impl SqliteRecordStore {
    /// Open (or create) the store database at the given path.
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)?;

        // WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrate(&conn)?;

        info!(path = %db_path.display(), "record store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn schema_version(&self) -> Result<u32, StoreError> {
        let conn = self.conn.lock();
        Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }
}

/// Create partitions if the database is older than [`SCHEMA_VERSION`].
fn migrate(conn: &Connection) -> Result<(), StoreError> {
    let current: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if current >= SCHEMA_VERSION {
        debug!(version = current, "record store schema up to date");
        return Ok(());
    }

    for partition in Partition::ALL {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
            partition.name()
        ))?;
    }
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

    info!(from = current, to = SCHEMA_VERSION, "record store schema upgraded");
    Ok(())
}

impl RecordStore for SqliteRecordStore {
    fn put(&self, partition: Partition, record: Record) -> Result<(), StoreError> {
        let value = serde_json::to_string(&record.value)?;
        let conn = self.conn.lock();
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO {} (key, value) VALUES (?1, ?2)",
                partition.name()
            ),
            params![record.key, value],
        )?;
        Ok(())
    }

    fn get(&self, partition: Partition, key: &str) -> Result<Option<Record>, StoreError> {
        let conn = self.conn.lock();
        let raw: Option<String> = conn
            .query_row(
                &format!("SELECT value FROM {} WHERE key = ?1", partition.name()),
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        match raw {
            Some(text) => Ok(Some(Record::new(key, serde_json::from_str(&text)?))),
            None => Ok(None),
        }
    }

    fn get_all(&self, partition: Partition) -> Result<Vec<Record>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!("SELECT key, value FROM {}", partition.name()))?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (key, text) = row?;
            records.push(Record::new(key, serde_json::from_str(&text)?));
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn reopen_keeps_records_and_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.sqlite3");
        {
            let store = SqliteRecordStore::open(&path).unwrap();
            assert_eq!(store.schema_version().unwrap(), SCHEMA_VERSION);
            store
                .put(Partition::State, Record::new("ui", serde_json::json!({"showPolite": true})))
                .unwrap();
        }

        let store = SqliteRecordStore::open(&path).unwrap();
        assert_eq!(store.schema_version().unwrap(), SCHEMA_VERSION);
        assert_eq!(
            store.get(Partition::State, "ui").unwrap(),
            Some(Record::new("ui", serde_json::json!({"showPolite": true})))
        );
    }

    #[test]
    fn partitions_are_independent() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        store
            .put(Partition::Phrases, Record::new("ui", serde_json::json!("phrase")))
            .unwrap();
        assert_eq!(store.get(Partition::State, "ui").unwrap(), None);
        assert_eq!(store.get_all(Partition::Phrases).unwrap().len(), 1);
        assert!(store.get_all(Partition::State).unwrap().is_empty());
    }

    #[test]
    fn migration_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        conn.execute("INSERT INTO phrases (key, value) VALUES ('a', '1')", [])
            .unwrap();
        migrate(&conn).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM phrases", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
