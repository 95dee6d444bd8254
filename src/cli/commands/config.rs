//! Config command implementation
//!
//! Implements `bundlesmith config` to show the effective configuration.

use anyhow::{Context, Result};

use crate::cli::output;
use crate::core::global_config::GlobalConfig;
use crate::infra::dirs::BundlesmithDirs;

/// Execute the config command
pub async fn execute(path_only: bool) -> Result<()> {
    let dirs = BundlesmithDirs::new();
    let path = dirs.global_config_path();

    if path_only {
        println!("{}", path.display());
        return Ok(());
    }

    let config = GlobalConfig::load(&dirs).context("Failed to load configuration")?;
    let effective = config.effective(&dirs);

    if output::is_json() {
        return output::print_json(&effective);
    }

    if !output::is_quiet() {
        let origin = if path.exists() { "" } else { " (not found, using defaults)" };
        println!("# {}{origin}", path.display());
    }
    print!("{}", effective.to_toml()?);
    Ok(())
}
