//! Default configuration values

/// Reserved file name of the fingerprint manifest inside an installed target
pub const MANIFEST_FILE_NAME: &str = ".bundlesmith-manifest.json";

/// File name for the diff result written next to a build
pub const DIFF_FILE_NAME: &str = ".bundlesmith-diff.json";

/// Maximum number of files fingerprinted per source tree
pub const MAX_SCANNED_FILES: usize = 1000;

/// Sliding window in which failures count towards opening a target's circuit
pub const FAILURE_WINDOW_MS: u64 = 5 * 60 * 1000; // 5 minutes

/// Number of failures within the window that opens a circuit
pub const FAILURE_THRESHOLD: usize = 3;

/// Age after which failure timestamps are pruned
pub const FAILURE_RETENTION_MS: u64 = 60 * 60 * 1000; // 1 hour

/// Age after which finished jobs are eligible for cleanup
pub const JOB_RETENTION_MS: u64 = 60 * 60 * 1000; // 1 hour

/// Watchdog for a single build command
pub const BUILD_TIMEOUT_MS: u64 = 30 * 60 * 1000; // 30 minutes

/// Watchdog for a single archive extraction
pub const EXTRACTION_TIMEOUT_MS: u64 = 10 * 60 * 1000; // 10 minutes

/// Minimum proptest iterations
pub const MIN_PROPTEST_ITERATIONS: u32 = 100;

/// Default number of concurrent extractions for a machine with `cpus` cores
pub fn extraction_concurrency(cpus: usize) -> usize {
    (cpus / 2).max(1)
}

/// Default number of concurrent packaging builds for a machine with `cpus` cores
pub fn packaging_concurrency(cpus: usize) -> usize {
    (cpus / 4).max(1)
}
