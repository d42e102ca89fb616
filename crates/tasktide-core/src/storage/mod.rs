pub mod config;
pub mod database;

pub use config::Config;
pub use database::Database;

use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::StorageError;
use crate::timer::PersistedSnapshot;

/// Key the timer snapshot is stored under.
pub const SNAPSHOT_KEY: &str = "pomodoroTimerState";

/// Returns the data directory, creating it if needed.
///
/// `TASKTIDE_DATA_DIR` wins when set. Otherwise `~/.config/tasktide[-dev]/`,
/// with the `-dev` suffix when `TASKTIDE_ENV=dev`.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, StorageError> {
    let dir = match std::env::var_os("TASKTIDE_DATA_DIR") {
        Some(custom) => PathBuf::from(custom),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("TASKTIDE_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("tasktide-dev")
            } else {
                base_dir.join("tasktide")
            }
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Durable home for the single timer snapshot.
pub trait SnapshotStore: Send + Sync {
    /// # Errors
    /// Returns an error if the backing store cannot be read or the stored
    /// record cannot be decoded.
    fn load(&self) -> Result<Option<PersistedSnapshot>, StorageError>;

    /// # Errors
    /// Returns an error if the snapshot cannot be written.
    fn save(&self, snapshot: &PersistedSnapshot) -> Result<(), StorageError>;
}

/// Process-local store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    record: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with raw JSON, as if a previous process had written it.
    pub fn with_raw(json: impl Into<String>) -> Self {
        Self {
            record: Mutex::new(Some(json.into())),
        }
    }

    pub fn raw(&self) -> Option<String> {
        self.record.lock().ok().and_then(|r| r.clone())
    }
}

impl SnapshotStore for MemoryStore {
    fn load(&self) -> Result<Option<PersistedSnapshot>, StorageError> {
        let record = self.record.lock().map_err(|_| StorageError::Poisoned)?;
        match record.as_deref() {
            Some(json) => Ok(Some(serde_json::from_str(json)?)),
            None => Ok(None),
        }
    }

    fn save(&self, snapshot: &PersistedSnapshot) -> Result<(), StorageError> {
        let json = serde_json::to_string(snapshot)?;
        *self.record.lock().map_err(|_| StorageError::Poisoned)? = Some(json);
        Ok(())
    }
}

impl<S: SnapshotStore + ?Sized> SnapshotStore for std::sync::Arc<S> {
    fn load(&self) -> Result<Option<PersistedSnapshot>, StorageError> {
        (**self).load()
    }

    fn save(&self, snapshot: &PersistedSnapshot) -> Result<(), StorageError> {
        (**self).save(snapshot)
    }
}
