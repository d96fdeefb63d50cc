//! Lossless text embedding of binary payloads.
//!
//! Blobs travel as RFC 2397 data URLs (`data:<mime>;base64,<payload>`), the
//! same representation the desktop produces when it reads a `Blob` into a
//! string, so artifacts stay readable by older builds.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;

use crate::error::SnapshotError;
use crate::models::record::{RecordValue, StoredField};
use crate::models::snapshot::{BlobField, FieldValue, StoreRecord};

const DATA_URL_PREFIX: &str = "data:";
const BASE64_MARKER: &str = ";base64,";
const FALLBACK_MIME: &str = "application/octet-stream";

pub fn encode(bytes: &[u8], mime: &str) -> BlobField {
    BlobField {
        mime: mime.to_string(),
        encoded_bytes: STANDARD.encode(bytes),
    }
}

pub fn decode(field: &BlobField) -> Result<Bytes, SnapshotError> {
    STANDARD
        .decode(field.encoded_bytes.as_bytes())
        .map(Bytes::from)
        .map_err(|e| SnapshotError::MalformedBlob(e.to_string()))
}

impl BlobField {
    pub fn to_data_url(&self) -> String {
        format!(
            "{DATA_URL_PREFIX}{}{BASE64_MARKER}{}",
            self.mime, self.encoded_bytes
        )
    }

    /// Split a data URL into mime and payload. Text that is not a base64 data
    /// URL is kept whole so the failure surfaces when the blob is decoded.
    /// The marker is searched from the right: base64 never contains `;` or `,`.
    pub fn from_data_url(text: &str) -> Self {
        let parsed = text
            .strip_prefix(DATA_URL_PREFIX)
            .and_then(|rest| rest.rsplit_once(BASE64_MARKER));

        match parsed {
            Some((mime, payload)) => BlobField {
                mime: mime.to_string(),
                encoded_bytes: payload.to_string(),
            },
            None => BlobField {
                mime: FALLBACK_MIME.to_string(),
                encoded_bytes: text.to_string(),
            },
        }
    }
}

/// Encode a live record for embedding in an artifact.
pub fn encode_record(key: &str, value: &RecordValue) -> StoreRecord {
    let fields = value
        .iter()
        .map(|(name, field)| {
            let encoded = match field {
                StoredField::Json(v) => FieldValue::Json(v.clone()),
                StoredField::Binary { mime, data } => FieldValue::Blob(encode(data, mime)),
            };
            (name.clone(), encoded)
        })
        .collect();
    StoreRecord {
        key: key.to_string(),
        fields,
    }
}

/// Reverse [`encode_record`]. Fails if any blob field is malformed.
pub fn decode_record(record: StoreRecord) -> Result<(String, RecordValue), SnapshotError> {
    let mut value = RecordValue::new();
    for (name, field) in record.fields {
        let stored = match field {
            FieldValue::Json(v) => StoredField::Json(v),
            FieldValue::Blob(blob) => StoredField::Binary {
                data: decode(&blob)?,
                mime: blob.mime,
            },
        };
        value.insert(name, stored);
    }
    Ok((record.key, value))
}
