//! Platform-specific directory management
//!
//! Follows the XDG Base Directory Specification on Linux and standard
//! locations on macOS and Windows.
//!
//! Environment variables can override default directories:
//! - `BUNDLESMITH_CACHE_DIR` - Override cache directory
//! - `BUNDLESMITH_CONFIG_DIR` - Override config directory
//! - `BUNDLESMITH_DATA_DIR` - Override data directory

use std::env;
use std::path::PathBuf;

/// Environment variable names for directory overrides
pub const ENV_CACHE_DIR: &str = "BUNDLESMITH_CACHE_DIR";
pub const ENV_CONFIG_DIR: &str = "BUNDLESMITH_CONFIG_DIR";
pub const ENV_DATA_DIR: &str = "BUNDLESMITH_DATA_DIR";

/// Application name used in directory paths
const APP_NAME: &str = "bundlesmith";

const WORK_SUBDIR: &str = "work";
const OUTPUT_SUBDIR: &str = "output";

/// Directory provider for bundlesmith
#[derive(Debug, Clone)]
pub struct BundlesmithDirs {
    cache_dir: PathBuf,
    config_dir: PathBuf,
    data_dir: PathBuf,
}

impl BundlesmithDirs {
    /// Checks environment variables first, then falls back to platform defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache_dir: resolve(ENV_CACHE_DIR, dirs::cache_dir(), &[".cache"]),
            config_dir: resolve(ENV_CONFIG_DIR, dirs::config_dir(), &[".config"]),
            data_dir: resolve(ENV_DATA_DIR, dirs::data_dir(), &[".local", "share"]),
        }
    }

    /// Cache directory, for data that can be regenerated
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone()
    }

    #[must_use]
    pub fn config_dir(&self) -> PathBuf {
        self.config_dir.clone()
    }

    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone()
    }

    /// Default destination for extracted sources
    #[must_use]
    pub fn work_dir(&self) -> PathBuf {
        self.cache_dir.join(WORK_SUBDIR)
    }

    /// Default destination for build artifacts
    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        self.data_dir.join(OUTPUT_SUBDIR)
    }

    /// Path to `config.toml` in the config directory
    #[must_use]
    pub fn global_config_path(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }
}

impl Default for BundlesmithDirs {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve(var: &str, platform: Option<PathBuf>, home_fallback: &[&str]) -> PathBuf {
    if let Ok(path) = env::var(var) {
        return PathBuf::from(path);
    }

    platform.map(|p| p.join(APP_NAME)).unwrap_or_else(|| {
        let base = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home_fallback
            .iter()
            .fold(base, |path, segment| path.join(segment))
            .join(APP_NAME)
    })
}
