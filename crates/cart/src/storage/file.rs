//! File-backed key-value store.
//!
//! The whole store is one JSON object (`{"key": "value", ...}`) so several
//! keys can share a file. Writes go to a sibling temp file which is then
//! renamed over the original. There is no cross-process locking: two
//! processes writing the same file race, and the last rename wins.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use super::{KeyValueStore, StorageError};

type Entries = BTreeMap<String, String>;

/// A store persisted to a single JSON file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<Entries>,
}

impl FileStore {
    /// Open (or lazily create) the store at `path`.
    ///
    /// The file is read once. A missing file is an empty store; a file that
    /// is not a JSON object of strings is logged and treated as empty, and
    /// will be replaced on the next write.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the file exists but cannot be read.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();

        let entries = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str::<Entries>(&raw).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Storage file is malformed, ignoring it");
                Entries::new()
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "Storage file does not exist yet");
                Entries::new()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Apply `change` to a copy of the entries, write it, then commit.
    fn update<F>(&self, change: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut Entries),
    {
        let mut entries = self.lock();
        let mut next = entries.clone();
        change(&mut next);
        write_atomically(&self.path, &next)?;
        *entries = next;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn write_atomically(path: &Path, entries: &Entries) -> Result<(), StorageError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let raw = serde_json::to_string_pretty(entries)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, raw)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }
}
