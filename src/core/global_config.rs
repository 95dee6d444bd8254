//! Global configuration management
//!
//! Reads settings from `config.toml` in the config directory. Every key is
//! optional; missing keys fall back to `config::defaults` or to values
//! derived from the machine's CPU count.
//!
//! The scheduler option names are also accepted in camelCase
//! (`maxConcurrentExtraction`, `failureWindowMs`, ...).

use crate::config::defaults;
use crate::core::circuit::CircuitConfig;
use crate::infra::dirs::BundlesmithDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Global configuration error types
#[derive(Error, Debug)]
pub enum GlobalConfigError {
    /// Failed to read config file
    #[error("Failed to read config file '{path}': {error}")]
    ReadError { path: String, error: String },

    /// Failed to parse config file
    #[error("Failed to parse config file '{path}': {error}")]
    ParseError { path: String, error: String },

    /// Failed to render the effective configuration
    #[error("Failed to serialize config: {error}")]
    SerializeError { error: String },
}

/// Global configuration for bundlesmith
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub scheduler: SchedulerSection,

    #[serde(default)]
    pub circuit: CircuitSection,

    #[serde(default)]
    pub build: BuildSection,

    #[serde(default)]
    pub extraction: ExtractionSection,
}

/// Scheduler concurrency and retention
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerSection {
    #[serde(alias = "maxConcurrentExtraction", skip_serializing_if = "Option::is_none")]
    pub max_concurrent_extraction: Option<usize>,

    #[serde(alias = "maxConcurrentPackaging", skip_serializing_if = "Option::is_none")]
    pub max_concurrent_packaging: Option<usize>,

    /// Finished jobs older than this are removed by cleanup
    #[serde(alias = "jobRetentionMs", skip_serializing_if = "Option::is_none")]
    pub job_retention_ms: Option<u64>,
}

/// Failure circuit thresholds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitSection {
    #[serde(alias = "failureWindowMs", skip_serializing_if = "Option::is_none")]
    pub failure_window_ms: Option<u64>,

    #[serde(alias = "failureThreshold", skip_serializing_if = "Option::is_none")]
    pub failure_threshold: Option<usize>,

    #[serde(alias = "failureRetentionMs", skip_serializing_if = "Option::is_none")]
    pub failure_retention_ms: Option<u64>,
}

/// Build command settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSection {
    /// Program and arguments run for every packaging job
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,

    #[serde(alias = "timeoutMs", skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Skip the build when nothing changed since the installed version
    #[serde(alias = "skipIdentical", skip_serializing_if = "Option::is_none")]
    pub skip_identical: Option<bool>,

    #[serde(alias = "outputDir", skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

/// Archive extraction settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionSection {
    #[serde(alias = "timeoutMs", skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    #[serde(alias = "workDir", skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<PathBuf>,
}

impl GlobalConfig {
    /// Load global configuration from the config directory
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns `GlobalConfigError::ParseError` if the config file exists but
    /// contains invalid TOML.
    pub fn load(dirs: &BundlesmithDirs) -> Result<Self, GlobalConfigError> {
        Self::load_from_path(&dirs.global_config_path())
    }

    /// Load global configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, GlobalConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| GlobalConfigError::ReadError {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| GlobalConfigError::ParseError {
            path: path.display().to_string(),
            error: e.to_string(),
        })
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String, GlobalConfigError> {
        toml::to_string_pretty(self).map_err(|e| GlobalConfigError::SerializeError {
            error: e.to_string(),
        })
    }

    /// Effective watchdog for one build command
    #[must_use]
    pub fn build_timeout(&self) -> Duration {
        Duration::from_millis(self.build.timeout_ms.unwrap_or(defaults::BUILD_TIMEOUT_MS))
    }

    /// Effective watchdog for one extraction
    #[must_use]
    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_millis(
            self.extraction
                .timeout_ms
                .unwrap_or(defaults::EXTRACTION_TIMEOUT_MS),
        )
    }

    #[must_use]
    pub fn skip_identical(&self) -> bool {
        self.build.skip_identical.unwrap_or(false)
    }

    /// Effective directory for build artifacts
    #[must_use]
    pub fn output_dir(&self, dirs: &BundlesmithDirs) -> PathBuf {
        self.build
            .output_dir
            .clone()
            .unwrap_or_else(|| dirs.output_dir())
    }

    /// Effective directory for extracted sources
    #[must_use]
    pub fn work_dir(&self, dirs: &BundlesmithDirs) -> PathBuf {
        self.extraction
            .work_dir
            .clone()
            .unwrap_or_else(|| dirs.work_dir())
    }

    /// Fully resolved scheduler settings with CPU-derived defaults
    #[must_use]
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig::from_global(self, num_cpus::get())
    }

    /// Copy with every unset key replaced by its effective value
    ///
    /// `build.command` has no default and stays unset if not configured.
    #[must_use]
    pub fn effective(&self, dirs: &BundlesmithDirs) -> Self {
        let resolved = self.scheduler_config();
        let millis = |d: Duration| u64::try_from(d.as_millis()).unwrap_or(u64::MAX);
        Self {
            scheduler: SchedulerSection {
                max_concurrent_extraction: Some(resolved.max_concurrent_extraction),
                max_concurrent_packaging: Some(resolved.max_concurrent_packaging),
                job_retention_ms: Some(millis(resolved.job_retention)),
            },
            circuit: CircuitSection {
                failure_window_ms: Some(millis(resolved.circuit.window)),
                failure_threshold: Some(resolved.circuit.threshold),
                failure_retention_ms: Some(millis(resolved.circuit.retention)),
            },
            build: BuildSection {
                command: self.build.command.clone(),
                timeout_ms: Some(millis(self.build_timeout())),
                skip_identical: Some(self.skip_identical()),
                output_dir: Some(self.output_dir(dirs)),
            },
            extraction: ExtractionSection {
                timeout_ms: Some(millis(self.extraction_timeout())),
                work_dir: Some(self.work_dir(dirs)),
            },
        }
    }
}

/// Resolved scheduler settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub max_concurrent_extraction: usize,
    pub max_concurrent_packaging: usize,
    pub job_retention: Duration,
    pub circuit: CircuitConfig,
}

impl SchedulerConfig {
    /// Resolve `config` for a machine with `cpus` cores
    ///
    /// Concurrency limits of 0 are clamped to 1.
    #[must_use]
    pub fn from_global(config: &GlobalConfig, cpus: usize) -> Self {
        let scheduler = &config.scheduler;
        let circuit = &config.circuit;
        Self {
            max_concurrent_extraction: scheduler
                .max_concurrent_extraction
                .unwrap_or_else(|| defaults::extraction_concurrency(cpus))
                .max(1),
            max_concurrent_packaging: scheduler
                .max_concurrent_packaging
                .unwrap_or_else(|| defaults::packaging_concurrency(cpus))
                .max(1),
            job_retention: Duration::from_millis(
                scheduler
                    .job_retention_ms
                    .unwrap_or(defaults::JOB_RETENTION_MS),
            ),
            circuit: CircuitConfig {
                window: Duration::from_millis(
                    circuit.failure_window_ms.unwrap_or(defaults::FAILURE_WINDOW_MS),
                ),
                threshold: circuit
                    .failure_threshold
                    .unwrap_or(defaults::FAILURE_THRESHOLD),
                retention: Duration::from_millis(
                    circuit
                        .failure_retention_ms
                        .unwrap_or(defaults::FAILURE_RETENTION_MS),
                ),
            },
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        GlobalConfig::default().scheduler_config()
    }
}
