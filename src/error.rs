//! Error types for bundlesmith
//!
//! Domain-specific error types using thiserror.

use std::path::PathBuf;
use thiserror::Error;

use crate::core::job::JobId;

/// Errors raised while fingerprinting a source tree
#[derive(Error, Debug)]
pub enum ScanError {
    /// Root directory does not exist or is not a directory
    #[error("Source directory not found: {path}")]
    RootNotFound { path: PathBuf },

    /// Root directory could not be listed
    #[error("Source directory '{path}' is unreadable: {error}")]
    RootUnreadable { path: PathBuf, error: String },
}

/// Errors reading or writing a persisted file manifest
#[derive(Error, Debug)]
pub enum ManifestError {
    /// Failed to read the manifest file
    #[error("Failed to read manifest '{path}': {error}")]
    Read { path: PathBuf, error: String },

    /// Manifest file exists but is not valid JSON for the format
    #[error("Failed to parse manifest '{path}': {error}")]
    Parse { path: PathBuf, error: String },

    /// Failed to write the manifest file
    #[error("Failed to write manifest '{path}': {error}")]
    Write { path: PathBuf, error: String },

    /// Serialization failure
    #[error("Failed to serialize manifest: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Job store errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobStoreError {
    /// No job with this id
    #[error("Job {id} not found")]
    NotFound { id: JobId },

    /// Job is not in one of the states the transition requires
    #[error("Invalid transition for job {id}: {from} -> {to} (allowed from: {allowed})")]
    InvalidTransition {
        id: JobId,
        from: String,
        to: String,
        allowed: String,
    },

    /// A job with this id is already stored
    #[error("Job {id} already exists")]
    Duplicate { id: JobId },
}

/// Failures raised by the extraction collaborator
#[derive(Error, Debug, Clone)]
pub enum ExtractionError {
    /// Archive is missing, unreadable or corrupt
    #[error("Archive '{path}' could not be extracted: {error}")]
    Archive { path: PathBuf, error: String },

    /// No tool available for this archive format
    #[error("No extraction tool available for '{path}': {tool} not found")]
    ToolMissing { path: PathBuf, tool: String },

    /// Watchdog expired
    #[error("Extraction timed out after {seconds}s")]
    TimedOut { seconds: u64 },
}

/// Failures raised by the build executor collaborator
#[derive(Error, Debug, Clone)]
pub enum BuildError {
    /// Build command exited unsuccessfully
    #[error("Build failed for '{target}': {error}")]
    BuildFailed { target: String, error: String },

    /// Build command is not configured or not runnable
    #[error("Build configuration error: {message}")]
    ConfigError { message: String },

    /// Watchdog expired
    #[error("Build timed out after {seconds}s")]
    TimedOut { seconds: u64 },
}

/// Job-level outcomes of a scheduler dispatch
///
/// These are recorded on the job record and published as events. They never
/// escape the dispatch loop.
#[derive(Error, Debug, Clone)]
pub enum SchedulerError {
    /// Source archive could not be extracted
    #[error("Extraction failed: {0}")]
    ExtractionFailure(String),

    /// Build executor or change detection failed
    #[error("Packaging failed: {0}")]
    PackagingFailure(String),

    /// Target is temporarily excluded after repeated failures
    #[error("Target '{target}' has failed repeatedly; dispatch suspended")]
    CircuitOpen { target: String },

    /// External call panicked
    #[error("Executor aborted unexpectedly: {0}")]
    ExecutorPanicked(String),
}
