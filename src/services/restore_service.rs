use bytes::Bytes;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::codec::blob::decode_record;
use crate::codec::gzip;
use crate::error::SnapshotError;
use crate::models::file::{FileMetadataTree, FILES_STORE_KEY};
use crate::models::snapshot::{Snapshot, StoreName};
use crate::persistence::{FlatStore, MemoryObjectStore, ObjectStoreBackend};
use crate::services::migration::{mark_migrated, migrate_legacy, MigrationReport};
use crate::services::parser::{
    classify_format, detect_encoding, metadata_tree, parse, ArtifactEncoding, SnapshotFormat,
};
use crate::services::reconcile::{index_library, reconcile_and_commit, ReconcileReport};
use crate::services::store_io::{read_all, replace_all, WriteOutcome};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "reason", rename_all = "snake_case")]
pub enum RestorePhase {
    Idle,
    Decompressing,
    Parsing,
    Classifying,
    Migrating,
    WritingStores,
    ReconcilingMetadata,
    Complete,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StoreWriteResult {
    Written {
        written: usize,
        failed_keys: Vec<String>,
    },
    Failed {
        reason: String,
    },
}

impl StoreWriteResult {
    pub fn is_written(&self) -> bool {
        matches!(self, StoreWriteResult::Written { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    pub phases: Vec<RestorePhase>,
    pub artifact_sha256: String,
    pub encoding: Option<ArtifactEncoding>,
    pub format: Option<SnapshotFormat>,
    pub snapshot_version: Option<u32>,
    pub snapshot_timestamp: Option<String>,
    pub migration: Option<MigrationReport>,
    pub flat_store: Option<StoreWriteResult>,
    pub stores: BTreeMap<StoreName, StoreWriteResult>,
    pub reconcile: Option<ReconcileReport>,
    pub restart_required: bool,
}

impl RestoreReport {
    pub fn final_phase(&self) -> RestorePhase {
        self.phases.last().cloned().unwrap_or(RestorePhase::Idle)
    }

    pub fn is_complete(&self) -> bool {
        self.final_phase() == RestorePhase::Complete
    }
}

/// Drives one restore from artifact bytes to reconciled live storage.
///
/// `run` returns `Err` only when it stopped before touching live storage.
/// Once store writes begin the restore runs to completion, and failures past
/// that point are recorded in the report instead.
pub struct RestoreOrchestrator {
    flat: Arc<dyn FlatStore>,
    objects: Arc<dyn ObjectStoreBackend>,
    chunk_size: usize,
    cancel: CancellationToken,
    report: RestoreReport,
}

/// The artifact decoded into an isolated working copy.
struct Staged {
    flat_store: BTreeMap<String, String>,
    objects: MemoryObjectStore,
    tree: Result<FileMetadataTree, String>,
    rejected: BTreeMap<StoreName, Vec<String>>,
}

impl RestoreOrchestrator {
    pub fn new(
        flat: Arc<dyn FlatStore>,
        objects: Arc<dyn ObjectStoreBackend>,
        chunk_size: usize,
    ) -> Self {
        Self {
            flat,
            objects,
            chunk_size,
            cancel: CancellationToken::new(),
            report: RestoreReport {
                phases: vec![RestorePhase::Idle],
                artifact_sha256: String::new(),
                encoding: None,
                format: None,
                snapshot_version: None,
                snapshot_timestamp: None,
                migration: None,
                flat_store: None,
                stores: BTreeMap::new(),
                reconcile: None,
                restart_required: false,
            },
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn transition(&mut self, next: RestorePhase) {
        tracing::info!(from = ?self.report.final_phase(), to = ?next, "Restore phase");
        self.report.phases.push(next);
    }

    fn fail(&mut self, err: SnapshotError) -> SnapshotError {
        tracing::error!(error = %err, "Restore aborted before any write");
        self.transition(RestorePhase::Failed(err.to_string()));
        err
    }

    pub async fn run(
        mut self,
        filename: Option<String>,
        artifact: Bytes,
    ) -> Result<RestoreReport, SnapshotError> {
        self.report.artifact_sha256 = hex::encode(Sha256::digest(&artifact));

        self.transition(RestorePhase::Decompressing);
        let encoding = detect_encoding(filename.as_deref(), &artifact);
        self.report.encoding = Some(encoding);
        // Inflate and parse off the async workers; both are CPU bound.
        let payload = match encoding {
            ArtifactEncoding::Gzip => {
                let chunk_size = self.chunk_size;
                let inflated =
                    tokio::task::spawn_blocking(move || gzip::decompress(&artifact, chunk_size))
                        .await;
                match inflated {
                    Ok(Ok(data)) => Bytes::from(data),
                    Ok(Err(e)) => return Err(self.fail(e)),
                    Err(e) => return Err(self.fail(SnapshotError::Task(e.to_string()))),
                }
            }
            ArtifactEncoding::Json => artifact,
        };

        self.transition(RestorePhase::Parsing);
        let parsed = tokio::task::spawn_blocking(move || parse(&payload)).await;
        let snapshot = match parsed {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(e)) => return Err(self.fail(e.into())),
            Err(e) => return Err(self.fail(SnapshotError::Task(e.to_string()))),
        };
        self.report.snapshot_version = snapshot.version;
        self.report.snapshot_timestamp = Some(snapshot.timestamp.clone());

        self.transition(RestorePhase::Classifying);
        let format = classify_format(&snapshot);
        self.report.format = Some(format);
        let mut staged = Self::stage(snapshot).await;

        if format == SnapshotFormat::Legacy {
            self.transition(RestorePhase::Migrating);
            let mut scratch = FileMetadataTree::default();
            let tree = staged.tree.as_mut().unwrap_or(&mut scratch);
            match migrate_legacy(&staged.objects, tree).await {
                Ok(report) => self.report.migration = Some(report),
                Err(e) => return Err(self.fail(e)),
            }
            mark_migrated(&mut staged.flat_store);
        }

        if self.cancel.is_cancelled() {
            return Err(self.fail(SnapshotError::Cancelled));
        }

        self.transition(RestorePhase::WritingStores);
        self.write_stores(&mut staged).await;

        self.transition(RestorePhase::ReconcilingMetadata);
        let index = index_library(self.objects.as_ref()).await;
        match reconcile_and_commit(self.flat.as_ref(), staged.tree, &index, true) {
            Ok(report) => self.report.reconcile = Some(report),
            Err(e) => {
                tracing::error!(error = %e, "Metadata reconciliation could not be committed");
                self.report.restart_required = true;
                self.transition(RestorePhase::Failed(e.to_string()));
                return Ok(self.report);
            }
        }

        self.report.restart_required = true;
        self.transition(RestorePhase::Complete);
        Ok(self.report)
    }

    /// Decode every record into an in-memory copy of the object stores.
    /// Records whose blobs do not decode are set aside and reported as
    /// failed for their store.
    async fn stage(snapshot: Snapshot) -> Staged {
        let Snapshot {
            mut flat_store,
            mut object_stores,
            ..
        } = snapshot;

        let tree = match metadata_tree(&flat_store) {
            Ok(tree) => Ok(tree.unwrap_or_default()),
            Err(e) => Err(e.to_string()),
        };
        flat_store.remove(FILES_STORE_KEY);

        let objects = MemoryObjectStore::new();
        let mut rejected: BTreeMap<StoreName, Vec<String>> = BTreeMap::new();
        for store in StoreName::ALL {
            // Memory stores never fail, so the clear only materialises the store.
            let _ = objects.clear(store).await;
            for record in object_stores.take(store) {
                let key = record.key.clone();
                let staged = match decode_record(record) {
                    Ok((key, value)) => objects.put(store, &key, value).await.map_err(|e| e.to_string()),
                    Err(e) => Err(e.to_string()),
                };
                if let Err(reason) = staged {
                    tracing::warn!(store = %store, key = %key, error = %reason, "Record rejected");
                    rejected.entry(store).or_default().push(key);
                }
            }
        }

        Staged {
            flat_store,
            objects,
            tree,
            rejected,
        }
    }

    /// Write the flat store and all four object stores concurrently. Each
    /// outcome is recorded; none of them stops the others.
    async fn write_stores(&mut self, staged: &mut Staged) {
        let flat = self.flat.clone();
        let flat_entries = std::mem::take(&mut staged.flat_store);
        let flat_write = async move {
            let keys = flat_entries.len();
            match flat.replace_all(flat_entries) {
                Ok(()) => StoreWriteResult::Written {
                    written: keys,
                    failed_keys: Vec::new(),
                },
                Err(e) => StoreWriteResult::Failed {
                    reason: e.to_string(),
                },
            }
        };

        let staging = &staged.objects;
        let live = self.objects.as_ref();
        let (flat_result, documents, images, trash, custom_wallpapers) = tokio::join!(
            flat_write,
            restore_store(staging, live, StoreName::Documents),
            restore_store(staging, live, StoreName::Images),
            restore_store(staging, live, StoreName::Trash),
            restore_store(staging, live, StoreName::CustomWallpapers),
        );

        self.report.flat_store = Some(flat_result);
        for (store, result) in [
            (StoreName::Documents, documents),
            (StoreName::Images, images),
            (StoreName::Trash, trash),
            (StoreName::CustomWallpapers, custom_wallpapers),
        ] {
            let rejected = staged.rejected.remove(&store).unwrap_or_default();
            let result = match result {
                Ok(mut outcome) => {
                    outcome.failed_keys.extend(rejected);
                    StoreWriteResult::Written {
                        written: outcome.written,
                        failed_keys: outcome.failed_keys,
                    }
                }
                Err(e) => {
                    tracing::error!(store = %store, error = %e, "Store restore failed");
                    StoreWriteResult::Failed {
                        reason: e.to_string(),
                    }
                }
            };
            self.report.stores.insert(store, result);
        }
    }
}

async fn restore_store(
    staging: &MemoryObjectStore,
    live: &dyn ObjectStoreBackend,
    store: StoreName,
) -> Result<WriteOutcome, SnapshotError> {
    let records = read_all(staging, store).await?;
    replace_all(live, store, records).await
}
