use bytes::Bytes;
use serde_json::Value;
use std::collections::BTreeMap;

/// A field as held by a live object store: either structured JSON or raw bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredField {
    Json(Value),
    Binary { mime: String, data: Bytes },
}

pub type RecordValue = BTreeMap<String, StoredField>;

pub fn record_name(value: &RecordValue) -> Option<&str> {
    match value.get("name") {
        Some(StoredField::Json(Value::String(name))) => Some(name),
        _ => None,
    }
}

/// Build a record from JSON-only fields.
pub fn json_record<I, K>(fields: I) -> RecordValue
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    fields
        .into_iter()
        .map(|(k, v)| (k.into(), StoredField::Json(v)))
        .collect()
}
