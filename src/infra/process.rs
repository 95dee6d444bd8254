//! External process execution with a watchdog

use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;

/// Why a bounded command did not produce output
#[derive(Debug)]
pub enum RunFailure {
    /// Program could not be started
    Spawn(std::io::Error),
    /// Watchdog expired; the child has been killed
    TimedOut,
}

/// Run `command` to completion, killing it if `limit` expires
///
/// Stdout and stderr are captured. A non-zero exit status is not an error
/// here; callers inspect [`Output::status`].
pub async fn run_bounded(mut command: Command, limit: Duration) -> Result<Output, RunFailure> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command.spawn().map_err(RunFailure::Spawn)?;
    match tokio::time::timeout(limit, child.wait_with_output()).await {
        Ok(result) => result.map_err(RunFailure::Spawn),
        Err(_) => Err(RunFailure::TimedOut),
    }
}

/// Last few lines of a process stream, for error messages
pub fn tail(bytes: &[u8], lines: usize) -> String {
    let text = String::from_utf8_lossy(bytes);
    let collected: Vec<&str> = text.lines().rev().take(lines).collect();
    collected.into_iter().rev().collect::<Vec<_>>().join("\n")
}
