//! Rebuild planning
//!
//! Fingerprints the current source tree, looks up the manifest of the
//! previous build of the same target, and classifies the delta. A prior
//! manifest that exists but cannot be read degrades the plan to a fresh
//! build instead of failing it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::diff::{classify, DiffResult};
use crate::core::fingerprint::HashManifestBuilder;
use crate::core::job::TargetIdentity;
use crate::core::manifest::FileManifest;
use crate::error::ScanError;
use crate::infra::locator::{manifest_path, InstallationLocator};

/// Everything the build executor needs to know about what changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackagingPlan {
    /// Fingerprint of the tree about to be built
    pub manifest: FileManifest,
    /// Delta against the previous build
    pub diff: DiffResult,
    /// Where the previous build was found
    pub prior_install: Option<PathBuf>,
}

/// Produces a [`PackagingPlan`] for a source tree and target
#[derive(Debug, Clone, Default)]
pub struct DiffPlanner {
    builder: HashManifestBuilder,
    locator: InstallationLocator,
}

impl DiffPlanner {
    pub fn new(builder: HashManifestBuilder, locator: InstallationLocator) -> Self {
        Self { builder, locator }
    }

    pub fn locator(&self) -> &InstallationLocator {
        &self.locator
    }

    /// Build the plan; blocking filesystem work
    pub fn plan(
        &self,
        source_dir: &Path,
        target: &TargetIdentity,
        app_version: &str,
    ) -> Result<PackagingPlan, ScanError> {
        let manifest = self.builder.build(source_dir, &target.app_name, app_version)?;

        let prior_install = self.locator.locate(target);
        let previous = prior_install.as_deref().and_then(|dir| {
            let path = manifest_path(dir);
            match FileManifest::load(&path) {
                Ok(previous) => Some(previous),
                Err(e) => {
                    tracing::warn!("Ignoring unreadable prior manifest, building fresh: {e}");
                    None
                }
            }
        });

        let diff = classify(&manifest, previous.as_ref());
        tracing::info!("Change detection for {target}: {}", diff.summary());

        Ok(PackagingPlan {
            manifest,
            diff,
            prior_install,
        })
    }
}
