//! Infrastructure layer
//!
//! Handles filesystem locations and external processes.

pub mod build_command;
pub mod dirs;
pub mod extract;
pub mod locator;
pub mod process;
