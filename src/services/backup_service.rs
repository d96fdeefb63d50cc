use serde::Serialize;
use std::collections::BTreeMap;

use crate::codec::blob::encode_record;
use crate::codec::gzip::ChunkCompressor;
use crate::error::SnapshotError;
use crate::models::snapshot::{ObjectStores, Snapshot, StoreName, StoreRecord};
use crate::persistence::{FlatStore, ObjectStoreBackend};
use crate::services::store_io::read_all;

#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub snapshot: Snapshot,
    /// Stores that could not be read and are empty in the snapshot.
    pub degraded_stores: Vec<StoreName>,
}

/// Capture the flat store and all four object stores. Only an unreadable
/// flat store fails the build; an unreadable object store is left empty.
pub async fn build_snapshot(
    flat: &dyn FlatStore,
    objects: &dyn ObjectStoreBackend,
) -> Result<BuildOutcome, SnapshotError> {
    let flat_store = flat
        .get_all()
        .map_err(|e| SnapshotError::FlatStore(e.to_string()))?;

    let (documents, images, trash, custom_wallpapers) = tokio::join!(
        read_encoded(objects, StoreName::Documents),
        read_encoded(objects, StoreName::Images),
        read_encoded(objects, StoreName::Trash),
        read_encoded(objects, StoreName::CustomWallpapers),
    );

    let mut degraded_stores = Vec::new();
    let mut settle = |store: StoreName, result: Result<Vec<StoreRecord>, SnapshotError>| {
        result.unwrap_or_else(|e| {
            tracing::error!(store = %store, error = %e, "Store skipped in backup");
            degraded_stores.push(store);
            Vec::new()
        })
    };

    let object_stores = ObjectStores {
        documents: settle(StoreName::Documents, documents),
        images: settle(StoreName::Images, images),
        trash: settle(StoreName::Trash, trash),
        custom_wallpapers: settle(StoreName::CustomWallpapers, custom_wallpapers),
    };

    let snapshot = Snapshot::new(flat_store, object_stores);
    tracing::info!(
        flat_keys = snapshot.flat_store.len(),
        records = snapshot.object_stores.record_count(),
        degraded = degraded_stores.len(),
        "Snapshot built"
    );

    Ok(BuildOutcome {
        snapshot,
        degraded_stores,
    })
}

async fn read_encoded(
    objects: &dyn ObjectStoreBackend,
    store: StoreName,
) -> Result<Vec<StoreRecord>, SnapshotError> {
    let records = read_all(objects, store).await?;
    Ok(records
        .iter()
        .map(|(key, value)| encode_record(key, value))
        .collect())
}

pub fn serialize_snapshot(snapshot: &Snapshot) -> Result<Vec<u8>, SnapshotError> {
    serde_json::to_vec(snapshot)
        .map_err(|e| SnapshotError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}

/// How a built snapshot is handed to the client.
pub struct ArtifactPlan {
    pub filename: String,
    pub content_type: &'static str,
    /// `None` means compression is unavailable and the artifact is plain JSON.
    pub compressor: Option<ChunkCompressor>,
}

pub fn plan_artifact(
    product: &str,
    timestamp: &str,
    compression_enabled: bool,
    compression_level: u32,
) -> ArtifactPlan {
    let stamp: String = timestamp
        .chars()
        .map(|c| if c == ':' || c == '.' { '-' } else { c })
        .collect();

    match ChunkCompressor::open(compression_enabled, compression_level) {
        Ok(compressor) => ArtifactPlan {
            filename: format!("{product}-backup-{stamp}.gz"),
            content_type: "application/gzip",
            compressor: Some(compressor),
        },
        Err(e) => {
            tracing::warn!(error = %e, "Falling back to uncompressed backup");
            ArtifactPlan {
                filename: format!("{product}-backup-{stamp}.json"),
                content_type: "application/json",
                compressor: None,
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreCounts {
    pub flat_keys: usize,
    pub records: BTreeMap<StoreName, usize>,
}

pub async fn store_counts(
    flat: &dyn FlatStore,
    objects: &dyn ObjectStoreBackend,
) -> Result<StoreCounts, SnapshotError> {
    let flat_keys = flat
        .get_all()
        .map_err(|e| SnapshotError::FlatStore(e.to_string()))?
        .len();
    let mut records = BTreeMap::new();
    for store in StoreName::ALL {
        let n = objects
            .count(store)
            .await
            .map_err(|source| SnapshotError::StoreRead { store, source })?;
        records.insert(store, n);
    }
    Ok(StoreCounts { flat_keys, records })
}
