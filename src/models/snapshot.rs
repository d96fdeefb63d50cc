use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

pub const SNAPSHOT_VERSION: u32 = 2;

/// Companion flag prefix marking a record field as blob-encoded.
pub const BLOB_FLAG_PREFIX: &str = "_isBlob_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreName {
    Documents,
    Images,
    Trash,
    CustomWallpapers,
}

impl StoreName {
    pub const ALL: [StoreName; 4] = [
        StoreName::Documents,
        StoreName::Images,
        StoreName::Trash,
        StoreName::CustomWallpapers,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreName::Documents => "documents",
            StoreName::Images => "images",
            StoreName::Trash => "trash",
            StoreName::CustomWallpapers => "custom_wallpapers",
        }
    }
}

impl fmt::Display for StoreName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Binary payload carried as text inside the JSON envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobField {
    pub mime: String,
    pub encoded_bytes: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Json(Value),
    Blob(BlobField),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawRecord", into = "RawRecord")]
pub struct StoreRecord {
    pub key: String,
    pub fields: BTreeMap<String, FieldValue>,
}

/// On-the-wire shape of a record: blob fields are flattened to their data URL
/// plus a `_isBlob_<field>: true` companion.
#[derive(Serialize, Deserialize)]
struct RawRecord {
    key: String,
    #[serde(default)]
    value: Map<String, Value>,
}

impl From<StoreRecord> for RawRecord {
    fn from(record: StoreRecord) -> Self {
        let mut value = Map::new();
        for (name, field) in record.fields {
            match field {
                FieldValue::Json(v) => {
                    value.insert(name, v);
                }
                FieldValue::Blob(blob) => {
                    value.insert(format!("{BLOB_FLAG_PREFIX}{name}"), Value::Bool(true));
                    value.insert(name, Value::String(blob.to_data_url()));
                }
            }
        }
        RawRecord {
            key: record.key,
            value,
        }
    }
}

impl From<RawRecord> for StoreRecord {
    fn from(raw: RawRecord) -> Self {
        let is_blob = |name: &str| {
            matches!(
                raw.value.get(&format!("{BLOB_FLAG_PREFIX}{name}")),
                Some(Value::Bool(true))
            )
        };

        // A flag is a companion only when it is `true` and names a text field.
        let is_companion_flag = |name: &str, v: &Value| {
            let Some(target) = name.strip_prefix(BLOB_FLAG_PREFIX) else {
                return false;
            };
            *v == Value::Bool(true) && matches!(raw.value.get(target), Some(Value::String(_)))
        };

        let mut fields = BTreeMap::new();
        for (name, v) in &raw.value {
            if is_companion_flag(name, v) {
                continue;
            }
            let field = match v {
                Value::String(text) if is_blob(name) => {
                    FieldValue::Blob(BlobField::from_data_url(text))
                }
                other => FieldValue::Json(other.clone()),
            };
            fields.insert(name.clone(), field);
        }

        StoreRecord {
            key: raw.key,
            fields,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectStores {
    #[serde(default)]
    pub documents: Vec<StoreRecord>,
    #[serde(default)]
    pub images: Vec<StoreRecord>,
    #[serde(default)]
    pub trash: Vec<StoreRecord>,
    #[serde(default)]
    pub custom_wallpapers: Vec<StoreRecord>,
}

impl ObjectStores {
    pub fn get(&self, store: StoreName) -> &Vec<StoreRecord> {
        match store {
            StoreName::Documents => &self.documents,
            StoreName::Images => &self.images,
            StoreName::Trash => &self.trash,
            StoreName::CustomWallpapers => &self.custom_wallpapers,
        }
    }

    pub fn get_mut(&mut self, store: StoreName) -> &mut Vec<StoreRecord> {
        match store {
            StoreName::Documents => &mut self.documents,
            StoreName::Images => &mut self.images,
            StoreName::Trash => &mut self.trash,
            StoreName::CustomWallpapers => &mut self.custom_wallpapers,
        }
    }

    pub fn take(&mut self, store: StoreName) -> Vec<StoreRecord> {
        std::mem::take(self.get_mut(store))
    }

    pub fn record_count(&self) -> usize {
        StoreName::ALL.iter().map(|s| self.get(*s).len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, deserialize_with = "lenient_string_map")]
    pub flat_store: BTreeMap<String, String>,
    #[serde(default)]
    pub object_stores: ObjectStores,
}

impl Snapshot {
    pub fn new(flat_store: BTreeMap<String, String>, object_stores: ObjectStores) -> Self {
        Self {
            version: Some(SNAPSHOT_VERSION),
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            flat_store,
            object_stores,
        }
    }
}

/// Older builds occasionally persisted numbers and booleans directly; keep
/// them as their JSON text rather than rejecting the artifact.
fn lenient_string_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, Value>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| match v {
            Value::String(s) => (k, s),
            other => (k, other.to_string()),
        })
        .collect())
}
