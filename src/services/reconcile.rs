//! Post-restore consistency pass over the file-metadata tree.
//!
//! After reconciliation every well-known directory exists, every library
//! entry carries a uuid, every `documents`/`images` record is referenced by
//! an entry, and `libraryState` matches whether any file entry exists. The
//! pass is a fixed point: a second run over the same storage changes nothing.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

use crate::error::SnapshotError;
use crate::models::file::{
    join_path, FileMetadataEntry, FileMetadataTree, LibraryState, DOCUMENTS_PATH,
    FILES_STORE_KEY, FILES_STORE_VERSION, IMAGES_PATH, WELL_KNOWN_DIRECTORIES,
};
use crate::models::record::record_name;
use crate::models::snapshot::StoreName;
use crate::persistence::{FlatStore, ObjectStoreBackend};
use crate::services::store_io::read_all;

/// Keys and display names of the live library records.
#[derive(Debug, Clone, Default)]
pub struct LibraryIndex {
    records: BTreeMap<StoreName, Vec<(String, Option<String>)>>,
}

impl LibraryIndex {
    pub fn insert(&mut self, store: StoreName, key: String, name: Option<String>) {
        self.records.entry(store).or_default().push((key, name));
    }

    fn store(&self, store: StoreName) -> &[(String, Option<String>)] {
        self.records.get(&store).map(Vec::as_slice).unwrap_or(&[])
    }
}

pub async fn index_library(objects: &dyn ObjectStoreBackend) -> LibraryIndex {
    let mut index = LibraryIndex::default();
    for store in [StoreName::Documents, StoreName::Images] {
        match read_all(objects, store).await {
            Ok(records) => {
                for (key, value) in records {
                    let name = record_name(&value).map(str::to_string);
                    index.insert(store, key, name);
                }
            }
            Err(e) => {
                tracing::warn!(store = %store, error = %e, "Library store unreadable during reconcile");
            }
        }
    }
    index
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub created_directories: Vec<String>,
    pub linked_entries: usize,
    pub synthesized_uuids: usize,
    pub created_entries: Vec<String>,
    pub library_state: LibraryState,
    pub changed: bool,
    /// Set when the emergency fallback tree was committed instead.
    pub error: Option<String>,
}

pub fn reconcile_tree(tree: &mut FileMetadataTree, index: &LibraryIndex) -> ReconcileReport {
    let before = tree.clone();
    let mut report = ReconcileReport::default();
    let items = &mut tree.state.items;

    for path in WELL_KNOWN_DIRECTORIES {
        if !items.contains_key(path) {
            items.insert(path.to_string(), FileMetadataEntry::directory(path));
            report.created_directories.push(path.to_string());
        }
    }

    let mut referenced: HashSet<String> = items.values().filter_map(|e| e.uuid.clone()).collect();

    for entry in items.values_mut() {
        if entry.has_uuid() {
            continue;
        }
        let Some(store) = entry.library_store() else {
            continue;
        };
        let candidate = index
            .store(store)
            .iter()
            .find(|(key, name)| {
                !referenced.contains(key) && name.as_deref().unwrap_or(key.as_str()) == entry.name
            })
            .map(|(key, _)| key.clone());
        let id = match candidate {
            Some(key) => {
                report.linked_entries += 1;
                key
            }
            None => {
                report.synthesized_uuids += 1;
                Uuid::new_v4().to_string()
            }
        };
        referenced.insert(id.clone());
        entry.uuid = Some(id);
    }

    for (store, dir) in [
        (StoreName::Documents, DOCUMENTS_PATH),
        (StoreName::Images, IMAGES_PATH),
    ] {
        for (key, name) in index.store(store) {
            if referenced.contains(key) {
                continue;
            }
            let path = unique_path(items, dir, name.as_deref().unwrap_or(key.as_str()));
            items.insert(path.clone(), FileMetadataEntry::file(path.clone(), key.clone()));
            referenced.insert(key.clone());
            report.created_entries.push(path);
        }
    }

    tree.state.library_state = if tree.has_files() {
        LibraryState::Loaded
    } else {
        LibraryState::Uninitialized
    };
    if tree.version.is_none() {
        tree.version = Some(FILES_STORE_VERSION);
    }

    report.library_state = tree.state.library_state;
    report.changed = *tree != before;
    report
}

/// `dir/name`, or `dir/stem (n).ext` with the smallest free `n`.
fn unique_path(items: &BTreeMap<String, FileMetadataEntry>, dir: &str, name: &str) -> String {
    let first = join_path(dir, name);
    if !items.contains_key(&first) {
        return first;
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, format!(".{ext}")),
        _ => (name, String::new()),
    };
    (2..)
        .map(|n| join_path(dir, &format!("{stem} ({n}){ext}")))
        .find(|p| !items.contains_key(p))
        .unwrap_or(first)
}

/// Well-known directories plus an entry for every live library record.
pub fn fallback_tree(index: &LibraryIndex) -> FileMetadataTree {
    let mut tree = FileMetadataTree::skeleton();
    reconcile_tree(&mut tree, index);
    tree
}

fn write_tree(flat: &dyn FlatStore, tree: &FileMetadataTree) -> Result<(), String> {
    let json = tree.to_json().map_err(|e| e.to_string())?;
    flat.set(FILES_STORE_KEY, &json).map_err(|e| e.to_string())
}

/// Reconcile `staged` against `index` and commit the result in one write.
///
/// `staged` is `Err` when the existing tree could not be read; the fallback
/// tree is committed in that case. `force_write` commits even when nothing
/// changed, for callers that have cleared the flat store beforehand.
pub fn reconcile_and_commit(
    flat: &dyn FlatStore,
    staged: Result<FileMetadataTree, String>,
    index: &LibraryIndex,
    force_write: bool,
) -> Result<ReconcileReport, SnapshotError> {
    let (mut tree, mut error) = match staged {
        Ok(tree) => (tree, None),
        Err(reason) => {
            tracing::error!(error = %reason, "Metadata tree unreadable, using fallback");
            (FileMetadataTree::skeleton(), Some(reason))
        }
    };

    let mut report = reconcile_tree(&mut tree, index);
    if !(report.changed || force_write || error.is_some()) {
        return Ok(report);
    }

    if let Err(reason) = write_tree(flat, &tree) {
        tracing::error!(error = %reason, "Metadata commit failed, writing fallback tree");
        let emergency = fallback_tree(index);
        write_tree(flat, &emergency).map_err(|fallback| {
            SnapshotError::MetadataReconcile(format!(
                "{reason}; fallback commit also failed: {fallback}"
            ))
        })?;
        report.library_state = emergency.state.library_state;
        error = Some(reason);
    }

    report.changed = true;
    report.error = error;
    tracing::info!(
        created_dirs = report.created_directories.len(),
        created_entries = report.created_entries.len(),
        linked = report.linked_entries,
        library_state = ?report.library_state,
        "Metadata reconciled"
    );
    Ok(report)
}

/// Run reconciliation against live storage. Writes only when something
/// actually changed.
pub async fn reconcile_metadata(
    flat: &dyn FlatStore,
    objects: &dyn ObjectStoreBackend,
) -> Result<ReconcileReport, SnapshotError> {
    let index = index_library(objects).await;
    let raw = flat
        .get(FILES_STORE_KEY)
        .map_err(|e| SnapshotError::FlatStore(e.to_string()))?;
    let staged = match raw.as_deref() {
        Some(raw) => FileMetadataTree::from_json(raw).map_err(|e| e.to_string()),
        None => Ok(FileMetadataTree::default()),
    };
    reconcile_and_commit(flat, staged, &index, false)
}
