//! Locate command implementation
//!
//! Implements `bundlesmith locate` to show where a target's previous build
//! was installed and which locations were probed.

use anyhow::Result;

use crate::cli::commands::TargetArgs;
use crate::cli::output::{self, status};
use crate::infra::locator::{manifest_path, InstallRoots, InstallationLocator};

/// Execute the locate command
pub async fn execute(target: &TargetArgs) -> Result<()> {
    let identity = target.identity();
    let locator = InstallationLocator::new(InstallRoots::from_env(), target.lookup_platform());
    let candidates = locator.candidates(&identity);
    let found = locator.locate(&identity);

    if output::is_json() {
        return output::print_json(&serde_json::json!({
            "target": identity.key(),
            "platform": locator.platform(),
            "found": found,
            "candidates": candidates,
        }));
    }

    match &found {
        Some(dir) => println!("{}", dir.display()),
        None => output::status_line(status::WARNING, format!("No installed build of {identity} found")),
    }

    if !output::is_quiet() {
        println!();
        println!("Searched ({}):", locator.platform());
        for candidate in &candidates {
            let mark = if manifest_path(candidate).is_file() {
                status::SUCCESS
            } else {
                " "
            };
            println!("  {mark} {}", candidate.display());
        }
    }
    Ok(())
}
