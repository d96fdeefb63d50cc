use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::StoreError;

pub const FLAT_STORE_FILE_VERSION: u32 = 1;

/// Synchronous string key/value store holding settings and file metadata.
pub trait FlatStore: Send + Sync {
    fn get_all(&self) -> Result<BTreeMap<String, String>, StoreError>;

    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    fn remove(&self, key: &str) -> Result<(), StoreError>;

    fn clear(&self) -> Result<(), StoreError>;

    /// Replace the whole store. Backends that can do this in one write should.
    fn replace_all(&self, entries: BTreeMap<String, String>) -> Result<(), StoreError> {
        self.clear()?;
        for (key, value) in &entries {
            self.set(key, value)?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryFlatStore {
    entries: DashMap<String, String>,
}

impl MemoryFlatStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FlatStore for MemoryFlatStore {
    fn get_all(&self) -> Result<BTreeMap<String, String>, StoreError> {
        Ok(self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect())
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.entries.clear();
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FlatStoreFile {
    version: u32,
    entries: BTreeMap<String, String>,
}

/// Flat store persisted as one bincode file, rewritten atomically on every
/// mutation.
#[derive(Debug)]
pub struct DiskFlatStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl DiskFlatStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let entries = load_entries(path)?.unwrap_or_default();
        tracing::info!(path = %path.display(), keys = entries.len(), "Flat store opened");
        Ok(Self {
            path: path.to_path_buf(),
            entries: RwLock::new(entries),
        })
    }

    fn mutate<F>(&self, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut BTreeMap<String, String>),
    {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {e}")))?;
        let mut next = entries.clone();
        f(&mut next);
        save_entries(&self.path, &next)?;
        *entries = next;
        Ok(())
    }
}

impl FlatStore for DiskFlatStore {
    fn get_all(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let entries = self
            .entries
            .read()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {e}")))?;
        Ok(entries.clone())
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self
            .entries
            .read()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {e}")))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.mutate(|m| {
            m.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.mutate(|m| {
            m.remove(key);
        })
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.mutate(|m| m.clear())
    }

    fn replace_all(&self, entries: BTreeMap<String, String>) -> Result<(), StoreError> {
        self.mutate(|m| *m = entries)
    }
}

fn save_entries(path: &Path, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
    let tmp_path = path.with_extension("bin.tmp");
    let file = FlatStoreFile {
        version: FLAT_STORE_FILE_VERSION,
        entries: entries.clone(),
    };
    let data = bincode::serialize(&file).map_err(|e| StoreError::Backend(e.to_string()))?;
    std::fs::write(&tmp_path, &data)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

fn load_entries(path: &Path) -> Result<Option<BTreeMap<String, String>>, StoreError> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read(path)?;
    match bincode::deserialize::<FlatStoreFile>(&data) {
        Ok(file) => {
            if file.version != FLAT_STORE_FILE_VERSION {
                tracing::warn!(
                    "Flat store version mismatch: expected {}, got {}",
                    FLAT_STORE_FILE_VERSION,
                    file.version
                );
                return Ok(None);
            }
            Ok(Some(file.entries))
        }
        Err(e) => {
            let quarantine = path.with_extension("bin.corrupt");
            tracing::error!(
                quarantine = %quarantine.display(),
                "Failed to deserialize flat store: {}",
                e
            );
            std::fs::rename(path, &quarantine)?;
            Ok(None)
        }
    }
}
