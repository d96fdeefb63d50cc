use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;
use tokio::sync::mpsc;

use crate::error::StoreError;
use crate::models::record::RecordValue;
use crate::models::snapshot::StoreName;

pub type CursorItem = Result<(String, RecordValue), StoreError>;

/// Lazy, finite, non-restartable enumeration of one store's records.
///
/// Backed by a bounded channel fed by a producer task, so at most
/// [`RecordCursor::BUFFER`] records are in flight at once.
pub struct RecordCursor {
    rx: mpsc::Receiver<CursorItem>,
}

impl RecordCursor {
    pub const BUFFER: usize = 16;

    pub fn channel() -> (mpsc::Sender<CursorItem>, Self) {
        let (tx, rx) = mpsc::channel(Self::BUFFER);
        (tx, Self { rx })
    }

    /// Cursor over records already in memory.
    pub fn from_entries(entries: Vec<(String, RecordValue)>) -> Self {
        let (tx, cursor) = Self::channel();
        tokio::spawn(async move {
            for entry in entries {
                if tx.send(Ok(entry)).await.is_err() {
                    break;
                }
            }
        });
        cursor
    }

    pub async fn next(&mut self) -> Option<CursorItem> {
        self.rx.recv().await
    }
}

/// Keyed binary-object storage split into named stores.
#[async_trait]
pub trait ObjectStoreBackend: Send + Sync {
    async fn open_cursor(&self, store: StoreName) -> Result<RecordCursor, StoreError>;

    async fn clear(&self, store: StoreName) -> Result<(), StoreError>;

    async fn put(&self, store: StoreName, key: &str, value: RecordValue) -> Result<(), StoreError>;

    async fn get(&self, store: StoreName, key: &str) -> Result<Option<RecordValue>, StoreError>;

    /// Deleting an absent key is not an error.
    async fn delete(&self, store: StoreName, key: &str) -> Result<(), StoreError>;

    async fn count(&self, store: StoreName) -> Result<usize, StoreError> {
        let mut cursor = self.open_cursor(store).await?;
        let mut n = 0;
        while let Some(item) = cursor.next().await {
            if item.is_ok() {
                n += 1;
            }
        }
        Ok(n)
    }
}

/// In-memory object stores. Records enumerate in ascending key order.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    stores: DashMap<StoreName, BTreeMap<String, RecordValue>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self, store: StoreName) -> Vec<String> {
        self.stores
            .get(&store)
            .map(|records| records.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ObjectStoreBackend for MemoryObjectStore {
    async fn open_cursor(&self, store: StoreName) -> Result<RecordCursor, StoreError> {
        let entries: Vec<_> = self
            .stores
            .get(&store)
            .map(|records| {
                records
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default();
        Ok(RecordCursor::from_entries(entries))
    }

    async fn clear(&self, store: StoreName) -> Result<(), StoreError> {
        self.stores.insert(store, BTreeMap::new());
        Ok(())
    }

    async fn put(&self, store: StoreName, key: &str, value: RecordValue) -> Result<(), StoreError> {
        self.stores
            .entry(store)
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, store: StoreName, key: &str) -> Result<Option<RecordValue>, StoreError> {
        Ok(self
            .stores
            .get(&store)
            .and_then(|records| records.get(key).cloned()))
    }

    async fn delete(&self, store: StoreName, key: &str) -> Result<(), StoreError> {
        if let Some(mut records) = self.stores.get_mut(&store) {
            records.remove(key);
        }
        Ok(())
    }

    async fn count(&self, store: StoreName) -> Result<usize, StoreError> {
        Ok(self.stores.get(&store).map(|r| r.len()).unwrap_or(0))
    }
}
