//! Core scheduling and change detection
//!
//! Process and filesystem side effects of builds live in [`crate::infra`];
//! this module only calls them through the traits in [`executor`].
//!
//! # Submodules
//!
//! - [`job`] - Job records, identities and states
//! - [`job_store`] - Authoritative job state with checked transitions
//! - [`events`] - Lifecycle event bus
//! - [`extraction`] - Bounded FIFO extraction stage
//! - [`packaging`] - Bounded priority packaging stage
//! - [`circuit`] - Per-target failure circuit
//! - [`pipeline`] - Wiring of both stages
//! - [`manifest`] - Fingerprint manifest format
//! - [`fingerprint`] - Source tree hashing
//! - [`diff`] - Manifest comparison
//! - [`planner`] - Change detection for one packaging job
//! - [`global_config`] - Global configuration management

pub mod circuit;
pub mod diff;
pub mod dispatch;
pub mod events;
pub mod executor;
pub mod extraction;
pub mod fingerprint;
pub mod global_config;
pub mod job;
pub mod job_store;
pub mod manifest;
pub mod packaging;
pub mod pipeline;
pub mod planner;
