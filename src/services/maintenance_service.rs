use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::SnapshotError;
use crate::models::file::{FileMetadataTree, FILES_STORE_KEY};
use crate::models::snapshot::StoreName;
use crate::persistence::{FlatStore, ObjectStoreBackend};
use crate::services::migration::MIGRATION_MARKER_KEY;

/// Keys that survive a settings reset.
const PRESERVED_ON_RESET: [&str; 2] = [FILES_STORE_KEY, MIGRATION_MARKER_KEY];

#[derive(Debug, Clone, Serialize)]
pub struct ResetReport {
    pub removed_keys: usize,
    pub preserved_keys: Vec<String>,
}

/// Drop every setting except the file metadata, in one write.
pub fn reset_settings(flat: &dyn FlatStore) -> Result<ResetReport, SnapshotError> {
    let all = flat
        .get_all()
        .map_err(|e| SnapshotError::FlatStore(e.to_string()))?;
    let total = all.len();

    let kept: BTreeMap<String, String> = all
        .into_iter()
        .filter(|(k, _)| PRESERVED_ON_RESET.contains(&k.as_str()))
        .collect();
    let preserved_keys: Vec<String> = kept.keys().cloned().collect();

    flat.replace_all(kept)
        .map_err(|e| SnapshotError::FlatStore(e.to_string()))?;

    tracing::info!(removed = total - preserved_keys.len(), "Settings reset");
    Ok(ResetReport {
        removed_keys: total - preserved_keys.len(),
        preserved_keys,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct FormatReport {
    pub cleared: Vec<StoreName>,
    pub failed: BTreeMap<StoreName, String>,
}

/// Empty every object store and reset the metadata tree to the well-known
/// directories. `libraryState` goes back to uninitialized so the desktop
/// seeds its sample documents again on the next boot.
pub async fn format_file_system(
    flat: &dyn FlatStore,
    objects: &dyn ObjectStoreBackend,
) -> Result<FormatReport, SnapshotError> {
    let mut report = FormatReport {
        cleared: Vec::new(),
        failed: BTreeMap::new(),
    };
    for store in StoreName::ALL {
        match objects.clear(store).await {
            Ok(()) => report.cleared.push(store),
            Err(e) => {
                tracing::error!(store = %store, error = %e, "Failed to clear store");
                report.failed.insert(store, e.to_string());
            }
        }
    }

    let json = FileMetadataTree::skeleton()
        .to_json()
        .map_err(|e| SnapshotError::MetadataReconcile(e.to_string()))?;
    flat.set(FILES_STORE_KEY, &json)
        .map_err(|e| SnapshotError::FlatStore(e.to_string()))?;

    tracing::info!(
        cleared = report.cleared.len(),
        failed = report.failed.len(),
        "File system formatted"
    );
    Ok(report)
}
