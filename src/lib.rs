//! Bundlesmith - incremental desktop installer build scheduler
//!
//! Extracts uploaded web-app bundles, fingerprints them, compares them with
//! the previously installed build of the same target and runs installer
//! builds with bounded concurrency.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface parsing and output formatting
//! - [`core`] - Scheduling, job state and change detection
//! - [`infra`] - Infrastructure layer (directories, processes)
//! - [`config`] - Configuration constants
//! - [`error`] - Error types and handling

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;
