//! Archive extraction through system tools
//!
//! Zip archives are unpacked with `unzip`, tarballs with `tar`. Directories
//! are accepted as already-extracted sources and used in place.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

use crate::core::executor::{ExtractionExecutor, ExtractionOutcome};
use crate::core::job::ExtractionPayload;
use crate::error::ExtractionError;
use crate::infra::process::{run_bounded, tail, RunFailure};

/// Archive formats the extractor understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    Tar,
    Directory,
}

impl ArchiveFormat {
    /// Detect the format from the path
    pub fn detect(path: &Path) -> Option<Self> {
        if path.is_dir() {
            return Some(Self::Directory);
        }
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if [".tar", ".tar.gz", ".tgz", ".tar.xz", ".tar.bz2"]
            .iter()
            .any(|ext| name.ends_with(ext))
        {
            Some(Self::Tar)
        } else {
            None
        }
    }

    fn tool(self) -> Option<&'static str> {
        match self {
            Self::Zip => Some("unzip"),
            Self::Tar => Some("tar"),
            Self::Directory => None,
        }
    }
}

/// [`ExtractionExecutor`] backed by `tar` and `unzip`
#[derive(Debug, Clone)]
pub struct ArchiveExtractor {
    timeout: Duration,
}

impl ArchiveExtractor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn command(format: ArchiveFormat, tool: PathBuf, archive: &Path, destination: &Path) -> Command {
        let mut command = Command::new(tool);
        match format {
            ArchiveFormat::Zip => {
                command.arg("-q").arg("-o").arg(archive).arg("-d").arg(destination);
            }
            ArchiveFormat::Tar => {
                command.arg("-xf").arg(archive).arg("-C").arg(destination);
            }
            ArchiveFormat::Directory => {}
        }
        command
    }
}

#[async_trait]
impl ExtractionExecutor for ArchiveExtractor {
    async fn extract(&self, payload: &ExtractionPayload) -> Result<ExtractionOutcome, ExtractionError> {
        let archive = &payload.archive;
        let format = ArchiveFormat::detect(archive).ok_or_else(|| ExtractionError::Archive {
            path: archive.clone(),
            error: if archive.exists() {
                "unsupported archive format".to_string()
            } else {
                "file not found".to_string()
            },
        })?;

        let Some(tool_name) = format.tool() else {
            tracing::debug!("Using directory {} in place", archive.display());
            return Ok(ExtractionOutcome {
                root: archive.clone(),
            });
        };

        let tool = which::which(tool_name).map_err(|_| ExtractionError::ToolMissing {
            path: archive.clone(),
            tool: tool_name.to_string(),
        })?;

        tokio::fs::create_dir_all(&payload.destination)
            .await
            .map_err(|e| ExtractionError::Archive {
                path: payload.destination.clone(),
                error: e.to_string(),
            })?;

        tracing::debug!(
            "Running {tool_name} for {} into {}",
            archive.display(),
            payload.destination.display()
        );
        let command = Self::command(format, tool, archive, &payload.destination);
        let output = run_bounded(command, self.timeout)
            .await
            .map_err(|failure| match failure {
                RunFailure::TimedOut => ExtractionError::TimedOut {
                    seconds: self.timeout.as_secs(),
                },
                RunFailure::Spawn(e) => ExtractionError::Archive {
                    path: archive.clone(),
                    error: e.to_string(),
                },
            })?;

        if !output.status.success() {
            return Err(ExtractionError::Archive {
                path: archive.clone(),
                error: format!("{tool_name} exited with {}: {}", output.status, tail(&output.stderr, 5)),
            });
        }

        Ok(ExtractionOutcome {
            root: payload.destination.clone(),
        })
    }
}
