use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::codec::blob::{decode_record, encode_record};
use crate::error::StoreError;
use crate::models::record::RecordValue;
use crate::models::snapshot::{StoreName, StoreRecord};
use crate::persistence::object_store::{ObjectStoreBackend, RecordCursor};

const RECORD_EXTENSION: &str = "json";

/// One directory per store, one JSON file per record.
///
/// Files are named by the SHA-256 of the record key, so arbitrary keys map to
/// safe fixed-length names; the key itself lives inside the file. Cursor order
/// is the sorted file-name order, which is stable between reads.
#[derive(Debug, Clone)]
pub struct DiskObjectStore {
    root: PathBuf,
}

impl DiskObjectStore {
    pub fn open(root: &Path) -> Result<Self, StoreError> {
        for store in StoreName::ALL {
            std::fs::create_dir_all(root.join(store.as_str()))?;
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn store_dir(&self, store: StoreName) -> PathBuf {
        self.root.join(store.as_str())
    }

    fn record_path(&self, store: StoreName, key: &str) -> PathBuf {
        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        self.store_dir(store)
            .join(format!("{digest}.{RECORD_EXTENSION}"))
    }
}

async fn read_record(path: &Path) -> Result<(String, RecordValue), StoreError> {
    let data = tokio::fs::read(path).await?;
    let corrupt = |reason: String| StoreError::CorruptRecord {
        key: path.display().to_string(),
        reason,
    };
    let record: StoreRecord =
        serde_json::from_slice(&data).map_err(|e| corrupt(e.to_string()))?;
    decode_record(record).map_err(|e| corrupt(e.to_string()))
}

#[async_trait]
impl ObjectStoreBackend for DiskObjectStore {
    async fn open_cursor(&self, store: StoreName) -> Result<RecordCursor, StoreError> {
        let dir = self.store_dir(store);
        let mut read_dir = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| StoreError::Unavailable {
                store: store.to_string(),
                reason: e.to_string(),
            })?;

        let mut paths = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(RECORD_EXTENSION) {
                paths.push(path);
            }
        }
        paths.sort();

        let (tx, cursor) = RecordCursor::channel();
        tokio::spawn(async move {
            for path in paths {
                let item = read_record(&path).await;
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });
        Ok(cursor)
    }

    async fn clear(&self, store: StoreName) -> Result<(), StoreError> {
        let dir = self.store_dir(store);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tokio::fs::create_dir_all(&dir).await?;
        Ok(())
    }

    async fn put(&self, store: StoreName, key: &str, value: RecordValue) -> Result<(), StoreError> {
        let path = self.record_path(store, key);
        let tmp_path = path.with_extension("json.tmp");
        let data = serde_json::to_vec(&encode_record(key, &value))
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        tokio::fs::write(&tmp_path, &data).await?;
        tokio::fs::rename(&tmp_path, &path).await?;
        Ok(())
    }

    async fn get(&self, store: StoreName, key: &str) -> Result<Option<RecordValue>, StoreError> {
        let path = self.record_path(store, key);
        match tokio::fs::metadata(&path).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let (_, value) = read_record(&path).await?;
        Ok(Some(value))
    }

    async fn delete(&self, store: StoreName, key: &str) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.record_path(store, key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
