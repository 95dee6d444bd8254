//! Manifest comparison
//!
//! Classifies every path of two manifests as changed, added, deleted or
//! unchanged. Hash equality is the only criterion; size and modification
//! time are informational and never used to short-circuit a comparison.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::core::manifest::FileManifest;

/// Overall update classification of a build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateKind {
    /// No prior installation of the target was found
    Fresh,
    /// Some files changed, appeared or disappeared
    Incremental,
    /// Nothing changed since the previous build
    Identical,
}

impl UpdateKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::Incremental => "incremental",
            Self::Identical => "identical",
        }
    }
}

impl fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delta between the current tree and the previous build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffResult {
    pub has_prior_installation: bool,
    pub prior_version: Option<String>,
    pub current_version: String,
    pub classification: UpdateKind,
    pub changed: BTreeSet<String>,
    pub added: BTreeSet<String>,
    pub deleted: BTreeSet<String>,
    pub unchanged: BTreeSet<String>,
}

impl DiffResult {
    /// Number of paths that differ from the previous build
    pub fn change_count(&self) -> usize {
        self.changed.len() + self.added.len() + self.deleted.len()
    }

    /// One-line human summary
    pub fn summary(&self) -> String {
        match self.classification {
            UpdateKind::Fresh => format!("fresh build ({} files)", self.added.len()),
            UpdateKind::Identical => format!(
                "identical to {} ({} files)",
                self.prior_version.as_deref().unwrap_or("previous build"),
                self.unchanged.len()
            ),
            UpdateKind::Incremental => format!(
                "{} changed, {} added, {} deleted, {} unchanged",
                self.changed.len(),
                self.added.len(),
                self.deleted.len(),
                self.unchanged.len()
            ),
        }
    }
}

/// Compare `current` against the manifest of the previous build, if any
pub fn classify(current: &FileManifest, previous: Option<&FileManifest>) -> DiffResult {
    let Some(previous) = previous else {
        return DiffResult {
            has_prior_installation: false,
            prior_version: None,
            current_version: current.app_version.clone(),
            classification: UpdateKind::Fresh,
            changed: BTreeSet::new(),
            added: current.files.keys().cloned().collect(),
            deleted: BTreeSet::new(),
            unchanged: BTreeSet::new(),
        };
    };

    let mut changed = BTreeSet::new();
    let mut added = BTreeSet::new();
    let mut unchanged = BTreeSet::new();

    for (path, entry) in &current.files {
        match previous.files.get(path) {
            Some(prior) if prior.hash == entry.hash => {
                unchanged.insert(path.clone());
            }
            Some(_) => {
                changed.insert(path.clone());
            }
            None => {
                added.insert(path.clone());
            }
        }
    }

    let deleted: BTreeSet<String> = previous
        .files
        .keys()
        .filter(|path| !current.files.contains_key(*path))
        .cloned()
        .collect();

    let classification = if changed.is_empty() && added.is_empty() && deleted.is_empty() {
        UpdateKind::Identical
    } else {
        UpdateKind::Incremental
    };

    DiffResult {
        has_prior_installation: true,
        prior_version: Some(previous.app_version.clone()),
        current_version: current.app_version.clone(),
        classification,
        changed,
        added,
        deleted,
        unchanged,
    }
}
