//! File manifest format
//!
//! A manifest records the content hash, size and modification time of every
//! fingerprinted file in a built target. One manifest is written into each
//! installed target (under [`MANIFEST_FILE_NAME`]) and read back by the next
//! build of the same target to decide what changed.
//!
//! ```json
//! { "appName": "Notes", "appVersion": "1.2.0", "timestamp": "2024-05-01T10:00:00Z",
//!   "files": { "index.html": { "hash": "…", "size": 512,
//!              "modified": "2024-05-01T09:59:00Z", "type": "markup" } },
//!   "metadata": { "totalFiles": 1, "platform": "linux" } }
//! ```
//!
//! [`MANIFEST_FILE_NAME`]: crate::config::defaults::MANIFEST_FILE_NAME

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use crate::error::ManifestError;

/// Content class of a fingerprinted file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileClass {
    Style,
    Script,
    Markup,
    Image,
    Icon,
    Font,
    Config,
    #[serde(other)]
    Unknown,
}

impl FileClass {
    /// Class for a file extension (case-insensitive, without the dot)
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "css" | "scss" | "sass" | "less" => Self::Style,
            "js" | "mjs" | "cjs" | "jsx" | "ts" | "tsx" | "wasm" => Self::Script,
            "html" | "htm" | "xml" | "xhtml" => Self::Markup,
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "bmp" | "avif" => Self::Image,
            "ico" | "icns" | "svg" => Self::Icon,
            "woff" | "woff2" | "ttf" | "otf" | "eot" => Self::Font,
            "json" | "webmanifest" | "yaml" | "yml" | "toml" | "ini" => Self::Config,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Style => "style",
            Self::Script => "script",
            Self::Markup => "markup",
            Self::Image => "image",
            Self::Icon => "icon",
            Self::Font => "font",
            Self::Config => "config",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FileClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fingerprint of a single file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Hex-encoded SHA-256 of the raw bytes
    pub hash: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
    #[serde(rename = "type")]
    pub class: FileClass,
}

/// Manifest summary block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestSummary {
    pub total_files: usize,
    /// Platform the manifest was generated on
    pub platform: String,
}

/// Fingerprint of a target's file tree at one point in time
///
/// Paths are relative to the tree root and always use `/` separators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileManifest {
    pub app_name: String,
    pub app_version: String,
    #[serde(rename = "timestamp")]
    pub generated_at: DateTime<Utc>,
    pub files: BTreeMap<String, FileEntry>,
    #[serde(rename = "metadata")]
    pub summary: ManifestSummary,
}

impl FileManifest {
    /// Assemble a manifest from already fingerprinted files
    pub fn new(
        app_name: impl Into<String>,
        app_version: impl Into<String>,
        platform: impl Into<String>,
        files: BTreeMap<String, FileEntry>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            app_version: app_version.into(),
            generated_at: Utc::now(),
            summary: ManifestSummary {
                total_files: files.len(),
                platform: platform.into(),
            },
            files,
        }
    }

    /// Parse from a JSON string
    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Serialize to a pretty JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load a manifest file
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path).map_err(|e| ManifestError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        Self::from_json(&content).map_err(|e| ManifestError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Write the manifest, creating parent directories as needed
    pub fn save(&self, path: &Path) -> Result<(), ManifestError> {
        let content = self.to_json()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ManifestError::Write {
                path: parent.to_path_buf(),
                error: e.to_string(),
            })?;
        }
        std::fs::write(path, content).map_err(|e| ManifestError::Write {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}
