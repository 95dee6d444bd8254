//! Diff command implementation
//!
//! Implements `bundlesmith diff`: fingerprints a source tree and compares it
//! with an explicit previous manifest or with the installed build.

use anyhow::{Context, Result};
use std::path::Path;

use crate::cli::commands::TargetArgs;
use crate::cli::output::{self, status};
use crate::core::diff::{classify, DiffResult};
use crate::core::fingerprint::HashManifestBuilder;
use crate::core::manifest::FileManifest;
use crate::core::planner::DiffPlanner;
use crate::infra::locator::{InstallRoots, InstallationLocator};

/// Execute the diff command
pub async fn execute(
    dir: &Path,
    target: &TargetArgs,
    app_version: &str,
    previous: Option<&Path>,
) -> Result<()> {
    let identity = target.identity();
    let diff = match previous {
        Some(path) => {
            let previous = FileManifest::load(path)
                .with_context(|| format!("Failed to load previous manifest {}", path.display()))?;
            let current = HashManifestBuilder::new()
                .build(dir, &identity.app_name, app_version)
                .with_context(|| format!("Failed to fingerprint {}", dir.display()))?;
            classify(&current, Some(&previous))
        }
        None => {
            let locator = InstallationLocator::new(InstallRoots::from_env(), target.lookup_platform());
            let planner = DiffPlanner::new(HashManifestBuilder::new(), locator);
            let plan = planner
                .plan(dir, &identity, app_version)
                .with_context(|| format!("Failed to fingerprint {}", dir.display()))?;
            if let Some(install) = &plan.prior_install {
                output::status_line(status::INFO, format!("Installed build: {}", install.display()));
            }
            plan.diff
        }
    };

    if output::is_json() {
        return output::print_json(&diff);
    }
    print_diff(&diff);
    Ok(())
}

fn print_diff(diff: &DiffResult) {
    if output::is_quiet() {
        println!("{}", diff.classification);
        return;
    }

    println!("{} {} ({})", status::SUCCESS, diff.classification, diff.summary());
    for (label, paths) in [("~", &diff.changed), ("+", &diff.added), ("-", &diff.deleted)] {
        for path in paths {
            println!("  {label} {path}");
        }
    }
}
