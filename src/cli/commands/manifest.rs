//! Manifest command implementation
//!
//! Implements `bundlesmith manifest` to fingerprint a source tree.

use anyhow::{Context, Result};
use std::path::Path;

use crate::cli::output::{self, status};
use crate::core::fingerprint::HashManifestBuilder;

/// Execute the manifest command
pub async fn execute(dir: &Path, name: &str, app_version: &str, out: Option<&Path>) -> Result<()> {
    let manifest = HashManifestBuilder::new()
        .build(dir, name, app_version)
        .with_context(|| format!("Failed to fingerprint {}", dir.display()))?;

    tracing::info!("Fingerprinted {} files in {}", manifest.file_count(), dir.display());

    match out {
        Some(path) => {
            manifest
                .save(path)
                .with_context(|| format!("Failed to write manifest to {}", path.display()))?;
            if output::is_json() {
                output::print_json(&serde_json::json!({
                    "path": path,
                    "totalFiles": manifest.file_count(),
                }))?;
            } else {
                output::status_line(
                    status::SUCCESS,
                    format!("Wrote manifest with {} files to {}", manifest.file_count(), path.display()),
                );
            }
        }
        None => println!("{}", manifest.to_json()?),
    }
    Ok(())
}
