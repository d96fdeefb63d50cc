//! Upgrade from filename-keyed records to uuid-keyed records.
//!
//! Older builds stored `documents` and `images` records under their file name
//! and linked metadata entries to them by name. The current layout keys every
//! record by a generated uuid and stores that uuid on the metadata entry.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

use crate::error::SnapshotError;
use crate::models::file::{FileMetadataTree, FILES_STORE_KEY};
use crate::models::record::record_name;
use crate::models::snapshot::StoreName;
use crate::persistence::{FlatStore, ObjectStoreBackend};
use crate::services::store_io::{read_all, rekey};

pub const MIGRATION_MARKER_KEY: &str = "ryos:uuid-migration-v1";
pub const MIGRATION_MARKER_VALUE: &str = "completed";

const MIGRATED_STORES: [StoreName; 2] = [StoreName::Documents, StoreName::Images];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub rekeyed: usize,
    pub already_absent: usize,
    /// Uuid-keyed records not yet linked, offered to entries by name.
    pub adopted: usize,
    pub linked_entries: usize,
    pub synthesized_entries: usize,
    pub failed_keys: Vec<String>,
}

pub fn is_generated_id(key: &str) -> bool {
    Uuid::parse_str(key).is_ok()
}

/// File name to newly assigned ids, each id handed out at most once.
#[derive(Debug, Default)]
struct MigrationMap {
    by_name: BTreeMap<String, Vec<(StoreName, String)>>,
}

impl MigrationMap {
    fn insert(&mut self, name: String, store: StoreName, id: String) {
        self.by_name.entry(name).or_default().push((store, id));
    }

    /// Prefer the mapping from `preferred`, else the first one left.
    fn take(&mut self, name: &str, preferred: Option<StoreName>) -> Option<String> {
        let ids = self.by_name.get_mut(name)?;
        let pos = preferred
            .and_then(|p| ids.iter().position(|(store, _)| *store == p))
            .unwrap_or(0);
        if pos >= ids.len() {
            return None;
        }
        Some(ids.remove(pos).1)
    }
}

/// Re-key every filename-keyed record in `documents` and `images`, then link
/// metadata entries that lack a uuid.
pub async fn migrate_legacy(
    objects: &dyn ObjectStoreBackend,
    tree: &mut FileMetadataTree,
) -> Result<MigrationReport, SnapshotError> {
    let mut map = MigrationMap::default();
    let mut report = MigrationReport::default();

    // Ids the tree already points at are never handed out again.
    let referenced: HashSet<String> = tree
        .state
        .items
        .values()
        .filter_map(|e| e.uuid.clone())
        .collect();

    for store in MIGRATED_STORES {
        let mut legacy_keys = Vec::new();
        for (key, value) in read_all(objects, store).await? {
            if !is_generated_id(&key) {
                legacy_keys.push(key);
            } else if !referenced.contains(&key) {
                // Keyed by an earlier run but never linked; adopt it by name.
                if let Some(name) = record_name(&value) {
                    map.insert(name.to_string(), store, key);
                    report.adopted += 1;
                }
            }
        }

        for key in legacy_keys {
            let new_id = Uuid::new_v4().to_string();
            match rekey(objects, store, &key, &new_id).await {
                Ok(true) => {
                    tracing::debug!(store = %store, from = %key, to = %new_id, "Record re-keyed");
                    map.insert(key, store, new_id);
                    report.rekeyed += 1;
                }
                Ok(false) => report.already_absent += 1,
                Err(e) => {
                    tracing::warn!(store = %store, key = %key, error = %e, "Re-key failed");
                    report.failed_keys.push(key);
                }
            }
        }
    }

    link_entries(tree, &mut map, &mut report);

    tracing::info!(
        rekeyed = report.rekeyed,
        adopted = report.adopted,
        linked = report.linked_entries,
        synthesized = report.synthesized_entries,
        failed = report.failed_keys.len(),
        "Legacy migration finished"
    );
    Ok(report)
}

/// Entries are visited in ascending path order, so with duplicate names the
/// lexically first path wins the mapped id and later ones get fresh ids.
fn link_entries(tree: &mut FileMetadataTree, map: &mut MigrationMap, report: &mut MigrationReport) {
    for entry in tree.state.items.values_mut() {
        if entry.is_directory || entry.has_uuid() {
            continue;
        }
        match map.take(&entry.name, entry.library_store()) {
            Some(id) => {
                entry.uuid = Some(id);
                report.linked_entries += 1;
            }
            None => {
                entry.uuid = Some(Uuid::new_v4().to_string());
                report.synthesized_entries += 1;
            }
        }
    }
}

pub fn mark_migrated(flat_store: &mut BTreeMap<String, String>) {
    flat_store.insert(
        MIGRATION_MARKER_KEY.to_string(),
        MIGRATION_MARKER_VALUE.to_string(),
    );
}

pub fn is_migrated(flat: &dyn FlatStore) -> Result<bool, SnapshotError> {
    let marker = flat
        .get(MIGRATION_MARKER_KEY)
        .map_err(|e| SnapshotError::FlatStore(e.to_string()))?;
    Ok(marker.as_deref() == Some(MIGRATION_MARKER_VALUE))
}

/// Migrate live storage in place, once. Returns `None` when the marker says
/// the work was already done.
pub async fn migrate_live_storage(
    flat: &dyn FlatStore,
    objects: &dyn ObjectStoreBackend,
) -> Result<Option<MigrationReport>, SnapshotError> {
    if is_migrated(flat)? {
        return Ok(None);
    }

    let raw_tree = flat
        .get(FILES_STORE_KEY)
        .map_err(|e| SnapshotError::FlatStore(e.to_string()))?;
    let mut tree = match raw_tree.as_deref() {
        Some(raw) => FileMetadataTree::from_json(raw)
            .map_err(|e| SnapshotError::MetadataReconcile(e.to_string()))?,
        None => FileMetadataTree::default(),
    };
    let before = tree.clone();

    let report = migrate_legacy(objects, &mut tree).await?;

    if tree != before {
        let json = tree
            .to_json()
            .map_err(|e| SnapshotError::MetadataReconcile(e.to_string()))?;
        flat.set(FILES_STORE_KEY, &json)
            .map_err(|e| SnapshotError::FlatStore(e.to_string()))?;
    }
    flat.set(MIGRATION_MARKER_KEY, MIGRATION_MARKER_VALUE)
        .map_err(|e| SnapshotError::FlatStore(e.to_string()))?;

    Ok(Some(report))
}
