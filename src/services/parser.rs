use serde::Serialize;
use serde_json::Value;

use crate::codec::gzip;
use crate::error::{ParseError, SnapshotError};
use crate::models::file::{FileMetadataTree, FILES_STORE_KEY};
use crate::models::snapshot::{Snapshot, SNAPSHOT_VERSION};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotFormat {
    Current,
    Legacy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactEncoding {
    Gzip,
    Json,
}

/// A `.gz` name or the gzip magic number means compressed; anything else is
/// treated as plain JSON text.
pub fn detect_encoding(filename: Option<&str>, bytes: &[u8]) -> ArtifactEncoding {
    let named_gz = filename.is_some_and(|f| f.to_ascii_lowercase().ends_with(".gz"));
    if named_gz || gzip::is_gzip(bytes) {
        ArtifactEncoding::Gzip
    } else {
        ArtifactEncoding::Json
    }
}

/// Decode the JSON envelope. Absent sections default to empty.
pub fn parse(bytes: &[u8]) -> Result<Snapshot, ParseError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| ParseError::NotJson(e.to_string()))?;
    if !value.is_object() {
        return Err(ParseError::NotAnObject);
    }
    serde_json::from_value(value).map_err(|e| ParseError::NotJson(e.to_string()))
}

/// Decompress when needed, then parse.
pub fn parse_artifact(
    filename: Option<&str>,
    bytes: &[u8],
    chunk_size: usize,
) -> Result<(Snapshot, ArtifactEncoding), SnapshotError> {
    let encoding = detect_encoding(filename, bytes);
    let snapshot = match encoding {
        ArtifactEncoding::Gzip => parse(&gzip::decompress(bytes, chunk_size)?)?,
        ArtifactEncoding::Json => parse(bytes)?,
    };
    Ok((snapshot, encoding))
}

/// Read the metadata tree out of a flat-store map. A missing key is an empty
/// tree; an unparseable one is reported to the caller.
pub fn metadata_tree(
    flat_store: &std::collections::BTreeMap<String, String>,
) -> Result<Option<FileMetadataTree>, serde_json::Error> {
    flat_store
        .get(FILES_STORE_KEY)
        .map(|raw| FileMetadataTree::from_json(raw))
        .transpose()
}

/// Legacy when the version is missing or old, or when file entries exist but
/// none of them carries a uuid.
pub fn classify_format(snapshot: &Snapshot) -> SnapshotFormat {
    match snapshot.version {
        Some(v) if v >= SNAPSHOT_VERSION => {}
        _ => return SnapshotFormat::Legacy,
    }

    match metadata_tree(&snapshot.flat_store) {
        Ok(Some(tree)) if tree.has_files() && !tree.files().any(|e| e.has_uuid()) => {
            SnapshotFormat::Legacy
        }
        _ => SnapshotFormat::Current,
    }
}
