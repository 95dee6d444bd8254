//! Source tree fingerprinting
//!
//! Walks an extracted web-app bundle and hashes the files that matter for a
//! rebuild decision: a fixed set of core files plus anything with a known
//! content extension. Dependency, version-control and temporary directories
//! are skipped, and the walk stops after a fixed number of files so a
//! pathological tree cannot stall the scheduler.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::path::{Component, Path};
use walkdir::{DirEntry, WalkDir};

use crate::config::defaults;
use crate::core::manifest::{FileClass, FileEntry, FileManifest};
use crate::error::ScanError;

/// Files always fingerprinted, whatever their extension
pub const CORE_FILES: &[&str] = &[
    "index.html",
    "package.json",
    "manifest.json",
    "main.js",
    "preload.js",
    "config.json",
    "app.config.json",
    "LICENSE",
];

/// Patterns that exclude a directory subtree when contained in its name
pub const EXCLUDED_DIRS: &[&str] = &[
    ".git",
    ".svn",
    ".hg",
    "node_modules",
    "bower_components",
    ".cache",
    ".tmp",
    "tmp",
    "temp",
];

/// Builds [`FileManifest`]s from directory trees
#[derive(Debug, Clone)]
pub struct HashManifestBuilder {
    max_files: usize,
    platform: String,
}

impl Default for HashManifestBuilder {
    fn default() -> Self {
        Self {
            max_files: defaults::MAX_SCANNED_FILES,
            platform: std::env::consts::OS.to_string(),
        }
    }
}

impl HashManifestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the number of fingerprinted files
    #[must_use]
    pub fn with_max_files(mut self, max_files: usize) -> Self {
        self.max_files = max_files;
        self
    }

    /// Override the platform recorded in the manifest summary
    #[must_use]
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    /// Fingerprint `root`
    ///
    /// Only an unreadable root is an error. Files that cannot be read are
    /// logged and left out of the manifest.
    pub fn build(
        &self,
        root: &Path,
        app_name: &str,
        app_version: &str,
    ) -> Result<FileManifest, ScanError> {
        if !root.is_dir() {
            return Err(ScanError::RootNotFound {
                path: root.to_path_buf(),
            });
        }
        std::fs::read_dir(root).map_err(|e| ScanError::RootUnreadable {
            path: root.to_path_buf(),
            error: e.to_string(),
        })?;

        let mut files = BTreeMap::new();
        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_excluded_dir(entry));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!("Skipping unreadable entry: {e}");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(class) = classify(entry.path()) else {
                continue;
            };
            if files.len() >= self.max_files {
                tracing::warn!(
                    "Fingerprint of {} truncated at {} files",
                    root.display(),
                    self.max_files
                );
                break;
            }
            let Some(relative) = relative_path(root, entry.path()) else {
                continue;
            };

            match fingerprint_file(entry.path(), class) {
                Ok(file) => {
                    files.insert(relative, file);
                }
                Err(e) => {
                    tracing::debug!("Skipping unreadable file {}: {e}", entry.path().display());
                }
            }
        }

        tracing::debug!("Fingerprinted {} files in {}", files.len(), root.display());
        Ok(FileManifest::new(app_name, app_version, self.platform.clone(), files))
    }
}

/// Class of a file if it belongs in the manifest
fn classify(path: &Path) -> Option<FileClass> {
    let name = path.file_name()?.to_str()?;
    if name == defaults::MANIFEST_FILE_NAME || name == defaults::DIFF_FILE_NAME {
        return None;
    }
    let class = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map_or(FileClass::Unknown, FileClass::from_extension);

    if CORE_FILES.contains(&name) || class != FileClass::Unknown {
        Some(class)
    } else {
        None
    }
}

/// Directories whose name contains an excluded pattern are pruned with their subtree
fn is_excluded_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| EXCLUDED_DIRS.iter().any(|pattern| name.contains(*pattern)))
}

/// `/`-separated path of `path` relative to `root`
fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<&str> = relative
        .components()
        .map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect::<Option<_>>()?;
    Some(parts.join("/"))
}

/// Hash a single file
pub fn fingerprint_file(path: &Path, class: FileClass) -> io::Result<FileEntry> {
    let metadata = std::fs::metadata(path)?;
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;

    let modified: DateTime<Utc> = metadata.modified().map_or_else(|_| Utc::now(), Into::into);

    Ok(FileEntry {
        hash: hex::encode(hasher.finalize()),
        size: metadata.len(),
        modified,
        class,
    })
}
