use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::snapshot::StoreName;

/// Flat-store key holding the serialized file-metadata tree.
pub const FILES_STORE_KEY: &str = "ryos:files";
pub const FILES_STORE_VERSION: u32 = 5;

pub const ROOT_PATH: &str = "/";
pub const DOCUMENTS_PATH: &str = "/Documents";
pub const IMAGES_PATH: &str = "/Images";
pub const TRASH_PATH: &str = "/Trash";

/// Directories that must exist after every restore, format, or reconcile.
pub const WELL_KNOWN_DIRECTORIES: [&str; 8] = [
    ROOT_PATH,
    DOCUMENTS_PATH,
    IMAGES_PATH,
    "/Applications",
    "/Music",
    "/Videos",
    "/Sites",
    TRASH_PATH,
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LibraryState {
    #[default]
    Uninitialized,
    Loaded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadataEntry {
    pub path: String,
    pub name: String,
    #[serde(rename = "isDirectory", default)]
    pub is_directory: bool,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FileMetadataEntry {
    pub fn directory(path: &str) -> Self {
        let name = if path == ROOT_PATH {
            ROOT_PATH.to_string()
        } else {
            file_name(path).to_string()
        };
        let icon = if path == TRASH_PATH {
            "/icons/trash-empty.png"
        } else {
            "/icons/directory.png"
        };
        Self {
            path: path.to_string(),
            name,
            is_directory: true,
            kind: Some("directory".into()),
            icon: Some(icon.into()),
            status: Some("active".into()),
            uuid: None,
            extra: Map::new(),
        }
    }

    pub fn file(path: String, uuid: String) -> Self {
        let name = file_name(&path).to_string();
        let kind = mime_guess::from_path(&name)
            .first()
            .map(|m| m.essence_str().to_string());
        let icon = match kind.as_deref() {
            Some(m) if m.starts_with("image/") => "/icons/image.png",
            _ => "/icons/file-text.png",
        };
        Self {
            path,
            name,
            is_directory: false,
            kind,
            icon: Some(icon.into()),
            status: Some("active".into()),
            uuid: Some(uuid),
            extra: Map::new(),
        }
    }

    pub fn has_uuid(&self) -> bool {
        self.uuid.as_deref().is_some_and(|u| !u.is_empty())
    }

    /// Object store implied by the entry's location, for library files only.
    pub fn library_store(&self) -> Option<StoreName> {
        if self.is_directory {
            return None;
        }
        if self.path.starts_with("/Documents/") {
            Some(StoreName::Documents)
        } else if self.path.starts_with("/Images/") {
            Some(StoreName::Images)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileSystemState {
    #[serde(default)]
    pub items: BTreeMap<String, FileMetadataEntry>,
    #[serde(rename = "libraryState", default)]
    pub library_state: LibraryState,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The persisted file-metadata tree, keyed by absolute path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadataTree {
    #[serde(default)]
    pub state: FileSystemState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
}

impl Default for FileMetadataTree {
    fn default() -> Self {
        Self {
            state: FileSystemState::default(),
            version: Some(FILES_STORE_VERSION),
        }
    }
}

impl FileMetadataTree {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// A tree containing only the well-known directories.
    pub fn skeleton() -> Self {
        let mut tree = Self::default();
        for path in WELL_KNOWN_DIRECTORIES {
            tree.state
                .items
                .insert(path.to_string(), FileMetadataEntry::directory(path));
        }
        tree
    }

    pub fn files(&self) -> impl Iterator<Item = &FileMetadataEntry> {
        self.state.items.values().filter(|e| !e.is_directory)
    }

    pub fn has_files(&self) -> bool {
        self.files().next().is_some()
    }
}

pub fn file_name(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
}

pub fn join_path(dir: &str, name: &str) -> String {
    if dir == ROOT_PATH {
        format!("/{name}")
    } else {
        format!("{}/{}", dir.trim_end_matches('/'), name)
    }
}
