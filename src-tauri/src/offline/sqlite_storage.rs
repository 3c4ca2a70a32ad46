//! SQLite-backed cache partitions (L2) with an in-memory LRU (L1) in front.
//! Snapshots are stored as MessagePack; entry keys are blake3 hashes of the
//! request identity.

use std::num::NonZeroUsize;
use std::path::Path;

use lru::LruCache;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use super::storage::{CacheStorage, StorageError};
use super::{CachedResponse, Request};

type MemoKey = (String, [u8; 32]);

pub struct SqliteCacheStorage {
    conn: Mutex<Connection>,
    memo: Mutex<LruCache<MemoKey, CachedResponse>>,
}

impl SqliteCacheStorage {
    /// Open (or create) the cache database at the given path.
    pub fn open(db_path: &Path, memo_capacity: usize) -> Result<Self, StorageError> {
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        let storage = Self::with_connection(conn, memo_capacity)?;
        info!(path = %db_path.display(), "offline cache opened");
        Ok(storage)
    }

    pub fn open_in_memory(memo_capacity: usize) -> Result<Self, StorageError> {
        Self::with_connection(Connection::open_in_memory()?, memo_capacity)
    }

    fn with_connection(conn: Connection, memo_capacity: usize) -> Result<Self, StorageError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS cache_partitions (
                name TEXT PRIMARY KEY,
                created_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS cache_entries (
                partition TEXT NOT NULL,
                request_key BLOB NOT NULL,
                method TEXT NOT NULL,
                url TEXT NOT NULL,
                snapshot BLOB NOT NULL,
                stored_at INTEGER NOT NULL,
                PRIMARY KEY (partition, request_key)
            );
            CREATE INDEX IF NOT EXISTS idx_cache_entries_key
                ON cache_entries(request_key);",
        )?;

        let capacity = NonZeroUsize::new(memo_capacity).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            conn: Mutex::new(conn),
            memo: Mutex::new(LruCache::new(capacity)),
        })
    }
}

fn ensure_partition(conn: &Connection, name: &str) -> Result<(), StorageError> {
    conn.execute(
        "INSERT OR IGNORE INTO cache_partitions (name, created_at) VALUES (?1, ?2)",
        params![name, now_unix()],
    )?;
    Ok(())
}

fn insert_entry(
    conn: &Connection,
    name: &str,
    request: &Request,
    snapshot: &[u8],
) -> Result<(), StorageError> {
    conn.execute(
        "INSERT OR REPLACE INTO cache_entries
         (partition, request_key, method, url, snapshot, stored_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            name,
            request.cache_key().as_slice(),
            request.method,
            request.url.as_str(),
            snapshot,
            now_unix()
        ],
    )?;
    Ok(())
}

impl CacheStorage for SqliteCacheStorage {
    fn open(&self, name: &str) -> Result<(), StorageError> {
        ensure_partition(&self.conn.lock(), name)
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT name FROM cache_partitions ORDER BY created_at, name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    fn has(&self, name: &str) -> Result<bool, StorageError> {
        let conn = self.conn.lock();
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM cache_partitions WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn delete(&self, name: &str) -> Result<bool, StorageError> {
        let removed = {
            let mut conn = self.conn.lock();
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM cache_entries WHERE partition = ?1", params![name])?;
            let removed = tx.execute("DELETE FROM cache_partitions WHERE name = ?1", params![name])?;
            tx.commit()?;
            removed > 0
        };

        let mut memo = self.memo.lock();
        let stale: Vec<MemoKey> = memo
            .iter()
            .filter(|((partition, _), _)| partition == name)
            .map(|(key, _)| key.clone())
            .collect();
        for key in stale {
            memo.pop(&key);
        }

        debug!(partition = name, removed, "cache partition deleted");
        Ok(removed)
    }

    fn put(&self, name: &str, request: &Request, response: &CachedResponse) -> Result<(), StorageError> {
        let snapshot = rmp_serde::to_vec_named(response)?;
        {
            let conn = self.conn.lock();
            ensure_partition(&conn, name)?;
            insert_entry(&conn, name, request, &snapshot)?;
        }
        self.memo
            .lock()
            .put((name.to_string(), request.cache_key()), response.clone());
        Ok(())
    }

    fn put_all(&self, name: &str, entries: &[(Request, CachedResponse)]) -> Result<(), StorageError> {
        let mut snapshots = Vec::with_capacity(entries.len());
        for (_, response) in entries {
            snapshots.push(rmp_serde::to_vec_named(response)?);
        }

        {
            let mut conn = self.conn.lock();
            let tx = conn.transaction()?;
            ensure_partition(&tx, name)?;
            for ((request, _), snapshot) in entries.iter().zip(&snapshots) {
                insert_entry(&tx, name, request, snapshot)?;
            }
            tx.commit()?;
        }

        let mut memo = self.memo.lock();
        for (request, response) in entries {
            memo.put((name.to_string(), request.cache_key()), response.clone());
        }
        Ok(())
    }

    fn match_in(&self, name: &str, request: &Request) -> Result<Option<CachedResponse>, StorageError> {
        let memo_key = (name.to_string(), request.cache_key());
        if let Some(hit) = self.memo.lock().get(&memo_key) {
            return Ok(Some(hit.clone()));
        }

        let raw: Option<Vec<u8>> = {
            let conn = self.conn.lock();
            conn.query_row(
                "SELECT snapshot FROM cache_entries WHERE partition = ?1 AND request_key = ?2",
                params![name, memo_key.1.as_slice()],
                |row| row.get(0),
            )
            .optional()?
        };

        match raw {
            Some(bytes) => {
                let response: CachedResponse = rmp_serde::from_slice(&bytes)?;
                self.memo.lock().put(memo_key, response.clone());
                Ok(Some(response))
            }
            None => Ok(None),
        }
    }

    fn match_any(&self, request: &Request) -> Result<Option<CachedResponse>, StorageError> {
        let key = request.cache_key();
        let raw: Option<(String, Vec<u8>)> = {
            let conn = self.conn.lock();
            conn.query_row(
                "SELECT e.partition, e.snapshot FROM cache_entries e
                 JOIN cache_partitions p ON p.name = e.partition
                 WHERE e.request_key = ?1
                 ORDER BY p.created_at, p.name LIMIT 1",
                params![key.as_slice()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
        };

        match raw {
            Some((partition, bytes)) => {
                let response: CachedResponse = rmp_serde::from_slice(&bytes)?;
                self.memo.lock().put((partition, key), response.clone());
                Ok(Some(response))
            }
            None => Ok(None),
        }
    }

    fn entry_count(&self, name: &str) -> Result<usize, StorageError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM cache_entries WHERE partition = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

/// Current time as Unix timestamp (seconds).
fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use reqwest::Url;

    fn request(path: &str) -> Request {
        Request::get(Url::parse(&format!("https://example.com{path}")).unwrap())
    }

    fn response(body: &str) -> CachedResponse {
        CachedResponse {
            status: 200,
            headers: vec![("content-type".into(), "text/plain".into())],
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.sqlite3");
        {
            let storage = SqliteCacheStorage::open(&path, 8).unwrap();
            storage.put("dynamic-v1", &request("/a"), &response("a")).unwrap();
        }
        let storage = SqliteCacheStorage::open(&path, 8).unwrap();
        assert_eq!(storage.keys().unwrap(), vec!["dynamic-v1".to_string()]);
        assert_eq!(
            storage.match_in("dynamic-v1", &request("/a")).unwrap(),
            Some(response("a"))
        );
    }

    #[test]
    fn delete_drops_entries_and_memo() {
        let storage = SqliteCacheStorage::open_in_memory(8).unwrap();
        storage
            .put_all("static-v0", &[(request("/"), response("old"))])
            .unwrap();
        assert_eq!(storage.match_any(&request("/")).unwrap(), Some(response("old")));

        assert!(storage.delete("static-v0").unwrap());
        assert!(!storage.delete("static-v0").unwrap());
        assert_eq!(storage.match_any(&request("/")).unwrap(), None);
        assert_eq!(storage.match_in("static-v0", &request("/")).unwrap(), None);
        assert_eq!(storage.entry_count("static-v0").unwrap(), 0);
    }

    #[test]
    fn open_creates_empty_partition() {
        let storage = SqliteCacheStorage::open_in_memory(0).unwrap();
        storage.open("static-v1").unwrap();
        storage.open("static-v1").unwrap();
        assert!(storage.has("static-v1").unwrap());
        assert_eq!(storage.keys().unwrap(), vec!["static-v1".to_string()]);
        assert_eq!(storage.entry_count("static-v1").unwrap(), 0);
    }
}
