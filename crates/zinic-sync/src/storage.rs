//! Key-value storages backing the sandbox store.
//!
//! Each key holds one whole JSON document. [`FileStorage`] keeps one file
//! per key and writes through a `.tmp` sibling that is renamed into place,
//! so a crash never leaves a half-written collection.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;
use zinic_core::error::{ZinicError, ZinicResult};
use zinic_core::repository::KeyValueStorage;

use crate::error::SyncError;

/// Process-local storage; contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> ZinicResult<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> ZinicResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One `<key>.json` file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Open (and create if needed) the storage directory.
    pub fn open(dir: impl AsRef<Path>) -> ZinicResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(SyncError::from)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> ZinicResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(ZinicError::Storage(format!("invalid storage key: {key:?}")));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> ZinicResult<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SyncError::from(e).into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> ZinicResult<()> {
        let path = self.path_for(key)?;
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, value).map_err(SyncError::from)?;
        fs::rename(&tmp_path, &path).map_err(SyncError::from)?;
        debug!(key, bytes = value.len(), "Persisted sandbox document");
        Ok(())
    }
}
