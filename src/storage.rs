//! # Persistence
//!
//! [`KeyValueStore`] is the trusted-storage seam: the wallet record, secret
//! included, only ever reaches disk through it. Values are stored as plain
//! text today; an encrypting implementation can wrap any store without the
//! orchestrators noticing.
//!
//! [`WalletRepository`] layers the record's JSON encoding on top and owns the
//! fixed storage key.

use crate::config::storage::{CORRUPT_RECORD_KEY, WALLET_RECORD_KEY};
use crate::error::{WalletError, WalletResult};
use crate::record::WalletRecord;
use std::{
    collections::HashMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Mutex,
};

/// String key-value storage, written whole-value at a time
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` when the key is absent
    fn get(&self, key: &str) -> WalletResult<Option<String>>;

    /// Replace the value under `key` atomically
    fn set(&self, key: &str, value: &str) -> WalletResult<()>;

    /// Remove the key; absent keys are not an error
    fn remove(&self, key: &str) -> WalletResult<()>;
}

/// One file per key inside a data directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    pub fn open(dir: impl Into<PathBuf>) -> WalletResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        log::debug!("Opened file store at {}", dir.display());
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> WalletResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
            && !key.starts_with('.');
        if !valid {
            return Err(WalletError::storage(format!("invalid storage key '{}'", key)));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> WalletResult<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> WalletResult<()> {
        let path = self.path_for(key)?;
        write_file_atomic(&path, value.as_bytes())
    }

    fn remove(&self, key: &str) -> WalletResult<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Safe file write: temp file then rename over the target
pub fn write_file_atomic(path: &Path, content: &[u8]) -> WalletResult<()> {
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, content)?;
    fs::rename(temp_path, path)?;
    Ok(())
}

/// In-process store, used by the demo walkthrough and tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> WalletResult<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| WalletError::storage("memory store lock poisoned"))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> WalletResult<Option<String>> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> WalletResult<()> {
        self.entries()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> WalletResult<()> {
        self.entries()?.remove(key);
        Ok(())
    }
}

/// Reads and writes the [`WalletRecord`] under its fixed key
pub struct WalletRepository {
    store: Box<dyn KeyValueStore>,
}

impl WalletRepository {
    pub fn new(store: Box<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Load the persisted record
    ///
    /// A value that fails to parse is moved to the corrupt-record key and
    /// reported as absent, so the user can create a new wallet while the old
    /// secret stays recoverable by hand.
    pub fn load(&self) -> WalletResult<Option<WalletRecord>> {
        let Some(raw) = self.store.get(WALLET_RECORD_KEY)? else {
            return Ok(None);
        };

        match serde_json::from_str::<WalletRecord>(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                log::error!(
                    "Stored wallet record is unreadable ({}), moving it to '{}'",
                    e,
                    CORRUPT_RECORD_KEY
                );
                self.store.set(CORRUPT_RECORD_KEY, &raw)?;
                self.store.remove(WALLET_RECORD_KEY)?;
                Ok(None)
            }
        }
    }

    /// Persist the whole record in one write
    pub fn save(&self, record: &WalletRecord) -> WalletResult<()> {
        let json = serde_json::to_string_pretty(record)?;
        self.store.set(WALLET_RECORD_KEY, &json)?;
        log::debug!("Persisted wallet record for {}", record.address);
        Ok(())
    }

    /// Delete the record. Irreversible.
    pub fn clear(&self) -> WalletResult<()> {
        self.store.remove(WALLET_RECORD_KEY)?;
        log::info!("Wallet record removed");
        Ok(())
    }
}
