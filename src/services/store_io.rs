use serde::Serialize;

use crate::error::{SnapshotError, StoreError};
use crate::models::record::RecordValue;
use crate::models::snapshot::StoreName;
use crate::persistence::ObjectStoreBackend;

/// Enumerate every readable record of `store`. Records that fail to read are
/// logged and skipped; only a failure to open the store is an error.
pub async fn read_all(
    objects: &dyn ObjectStoreBackend,
    store: StoreName,
) -> Result<Vec<(String, RecordValue)>, SnapshotError> {
    let mut cursor = objects
        .open_cursor(store)
        .await
        .map_err(|source| SnapshotError::StoreRead { store, source })?;

    let mut records = Vec::new();
    let mut skipped = 0usize;
    while let Some(item) = cursor.next().await {
        match item {
            Ok(record) => records.push(record),
            Err(e) => {
                skipped += 1;
                tracing::warn!(store = %store, error = %e, "Skipping unreadable record");
            }
        }
    }

    tracing::debug!(store = %store, records = records.len(), skipped, "Store enumerated");
    Ok(records)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WriteOutcome {
    pub written: usize,
    pub failed_keys: Vec<String>,
}

/// Clear `store`, then insert every record. A failed insert is recorded and
/// the remaining records are still attempted; a failed clear aborts the store.
pub async fn replace_all(
    objects: &dyn ObjectStoreBackend,
    store: StoreName,
    records: Vec<(String, RecordValue)>,
) -> Result<WriteOutcome, SnapshotError> {
    objects
        .clear(store)
        .await
        .map_err(|e| SnapshotError::StoreWrite {
            store,
            reason: format!("clear failed: {e}"),
        })?;

    let mut outcome = WriteOutcome::default();
    for (key, value) in records {
        match objects.put(store, &key, value).await {
            Ok(()) => outcome.written += 1,
            Err(e) => {
                tracing::warn!(store = %store, key = %key, error = %e, "Record write failed");
                outcome.failed_keys.push(key);
            }
        }
    }

    tracing::info!(
        store = %store,
        written = outcome.written,
        failed = outcome.failed_keys.len(),
        "Store replaced"
    );
    Ok(outcome)
}

/// Rename one record: get, put under the new key, delete the old key.
/// Returns `false` when the old key is already gone.
pub async fn rekey(
    objects: &dyn ObjectStoreBackend,
    store: StoreName,
    old_key: &str,
    new_key: &str,
) -> Result<bool, StoreError> {
    let Some(value) = objects.get(store, old_key).await? else {
        return Ok(false);
    };
    objects.put(store, new_key, value).await?;
    objects.delete(store, old_key).await?;
    Ok(true)
}
