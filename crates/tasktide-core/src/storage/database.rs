//! SQLite-backed key-value store.
//!
//! Holds the timer snapshot under [`SNAPSHOT_KEY`](super::SNAPSHOT_KEY) as a
//! JSON string. The connection sits behind a mutex so the store can be
//! shared with the engine's tick task.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection};

use super::{data_dir, SnapshotStore, SNAPSHOT_KEY};
use crate::error::StorageError;
use crate::timer::PersistedSnapshot;

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the database at `<data_dir>/tasktide.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, StorageError> {
        Self::open_at(&data_dir()?.join("tasktide.db"))
    }

    /// Open (or create) a database file at an explicit path.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_at(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path).map_err(|source| StorageError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    /// Returns an error if SQLite cannot allocate the database.
    pub fn open_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }

    fn migrate(&self) -> Result<(), StorageError> {
        self.conn()?.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let result = stmt.query_row(params![key], |row| row.get::<_, String>(0));
        match result {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.conn()?.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Remove a key. Returns whether anything was deleted.
    pub fn kv_delete(&self, key: &str) -> Result<bool, StorageError> {
        let n = self
            .conn()?
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(n > 0)
    }
}

impl SnapshotStore for Database {
    fn load(&self) -> Result<Option<PersistedSnapshot>, StorageError> {
        match self.kv_get(SNAPSHOT_KEY)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn save(&self, snapshot: &PersistedSnapshot) -> Result<(), StorageError> {
        let json = serde_json::to_string(snapshot)?;
        self.kv_set(SNAPSHOT_KEY, &json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::TimerMode;

    fn sample() -> PersistedSnapshot {
        PersistedSnapshot {
            end_time: Some(1_000_300_000),
            is_running: true,
            current_timer_type: TimerMode::ShortBreak,
            current_time_left: 300,
            saved_at: 1_000_000_000,
        }
    }

    #[test]
    fn kv_store() {
        let db = Database::open_memory().unwrap();
        assert!(db.kv_get("test").unwrap().is_none());
        db.kv_set("test", "hello").unwrap();
        assert_eq!(db.kv_get("test").unwrap().unwrap(), "hello");
        assert!(db.kv_delete("test").unwrap());
        assert!(!db.kv_delete("test").unwrap());
    }

    #[test]
    fn snapshot_overwrites_single_record() {
        let db = Database::open_memory().unwrap();
        assert!(db.load().unwrap().is_none());
        db.save(&sample()).unwrap();
        let mut next = sample();
        next.is_running = false;
        next.end_time = None;
        db.save(&next).unwrap();
        assert_eq!(db.load().unwrap(), Some(next));
    }

    #[test]
    fn corrupt_record_is_an_error() {
        let db = Database::open_memory().unwrap();
        db.kv_set(SNAPSHOT_KEY, "{\"isRunning\": \"maybe\"}").unwrap();
        assert!(matches!(db.load(), Err(StorageError::Corrupt(_))));
    }

    #[test]
    fn file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasktide.db");
        Database::open_at(&path).unwrap().save(&sample()).unwrap();
        let reopened = Database::open_at(&path).unwrap();
        assert_eq!(reopened.load().unwrap(), Some(sample()));
    }
}
