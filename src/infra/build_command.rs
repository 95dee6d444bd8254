//! Build executor that runs a configured command
//!
//! The command runs in the job's source directory. Before it starts, the
//! diff result is written to the job's output directory and the fresh
//! manifest is embedded at the source root, so the installer ships it and
//! the next build of the target can compare against it.
//!
//! The command sees these environment variables:
//!
//! | Variable                       | Value                                 |
//! |--------------------------------|---------------------------------------|
//! | `BUNDLESMITH_APP_NAME`         | target app name                       |
//! | `BUNDLESMITH_APP_VERSION`      | version being built                   |
//! | `BUNDLESMITH_ORGANIZATION`     | organization segment, if any          |
//! | `BUNDLESMITH_PLATFORMS`        | comma separated platform list         |
//! | `BUNDLESMITH_UPDATE_KIND`      | `fresh`, `incremental` or `identical` |
//! | `BUNDLESMITH_DIFF_FILE`        | path of the diff JSON                 |
//! | `BUNDLESMITH_OUTPUT_DIR`       | where artifacts are expected          |
//! | `BUNDLESMITH_OPTIONS`          | job options as JSON                   |

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use walkdir::WalkDir;

use crate::config::defaults::{self, DIFF_FILE_NAME, MANIFEST_FILE_NAME};
use crate::core::diff::UpdateKind;
use crate::core::executor::{BuildExecutor, ProgressReporter};
use crate::core::global_config::GlobalConfig;
use crate::core::job::{BuildOutcome, PackagingJob};
use crate::core::planner::PackagingPlan;
use crate::error::BuildError;
use crate::infra::dirs::BundlesmithDirs;
use crate::infra::process::{run_bounded, tail, RunFailure};

/// [`BuildExecutor`] running an external command per job
#[derive(Debug, Clone)]
pub struct CommandBuildExecutor {
    argv: Vec<String>,
    timeout: Duration,
    skip_identical: bool,
    output_dir: PathBuf,
}

impl CommandBuildExecutor {
    /// Create an executor for `argv`; the first element is the program
    pub fn new(argv: Vec<String>, output_dir: impl Into<PathBuf>) -> Result<Self, BuildError> {
        if argv.first().map_or(true, |program| program.trim().is_empty()) {
            return Err(BuildError::ConfigError {
                message: "build command is empty".to_string(),
            });
        }
        Ok(Self {
            argv,
            timeout: Duration::from_millis(defaults::BUILD_TIMEOUT_MS),
            skip_identical: false,
            output_dir: output_dir.into(),
        })
    }

    /// Create an executor from `[build]` in the global config
    pub fn from_config(config: &GlobalConfig, dirs: &BundlesmithDirs) -> Result<Self, BuildError> {
        let argv = config.build.command.clone().ok_or_else(|| BuildError::ConfigError {
            message: "no build command configured; set [build] command in config.toml".to_string(),
        })?;
        Ok(Self::new(argv, config.output_dir(dirs))?
            .with_timeout(config.build_timeout())
            .with_skip_identical(config.skip_identical()))
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_skip_identical(mut self, skip: bool) -> Self {
        self.skip_identical = skip;
        self
    }

    /// Output directory of one job: `<output>/<org>/<app>/<version>`
    pub fn job_output_dir(&self, job: &PackagingJob) -> PathBuf {
        let mut dir = self.output_dir.clone();
        if let Some(org) = job.target.organization_segment() {
            dir.push(org);
        }
        dir.join(&job.target.app_name).join(&job.payload.app_version)
    }

    fn command(&self, job: &PackagingJob, plan: &PackagingPlan, out_dir: &Path) -> Command {
        let mut command = Command::new(&self.argv[0]);
        command.args(&self.argv[1..]).current_dir(&job.payload.source_dir);

        let platforms: Vec<&str> = job.target.platforms.iter().map(|p| p.as_str()).collect();
        command
            .env("BUNDLESMITH_APP_NAME", &job.target.app_name)
            .env("BUNDLESMITH_APP_VERSION", &job.payload.app_version)
            .env("BUNDLESMITH_PLATFORMS", platforms.join(","))
            .env("BUNDLESMITH_UPDATE_KIND", plan.diff.classification.as_str())
            .env("BUNDLESMITH_DIFF_FILE", out_dir.join(DIFF_FILE_NAME))
            .env("BUNDLESMITH_OUTPUT_DIR", out_dir)
            .env("BUNDLESMITH_OPTIONS", job.payload.options.to_string());
        if let Some(org) = job.target.organization_segment() {
            command.env("BUNDLESMITH_ORGANIZATION", org);
        }
        command
    }

    fn prepare(&self, job: &PackagingJob, plan: &PackagingPlan, out_dir: &Path) -> Result<(), BuildError> {
        let target = job.target.key();
        let io_failure = |what: &str, path: &Path, e: &dyn std::fmt::Display| BuildError::BuildFailed {
            target: target.clone(),
            error: format!("failed to {what} '{}': {e}", path.display()),
        };

        std::fs::create_dir_all(out_dir).map_err(|e| io_failure("create", out_dir, &e))?;

        let diff_path = out_dir.join(DIFF_FILE_NAME);
        let diff_json = serde_json::to_vec_pretty(&plan.diff)
            .map_err(|e| io_failure("serialize", &diff_path, &e))?;
        std::fs::write(&diff_path, diff_json).map_err(|e| io_failure("write", &diff_path, &e))?;

        let manifest_path = job.payload.source_dir.join(MANIFEST_FILE_NAME);
        plan.manifest
            .save(&manifest_path)
            .map_err(|e| io_failure("embed manifest at", &manifest_path, &e))
    }
}

/// Files the command left in `out_dir`, excluding our own diff file
fn collect_artifacts(out_dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(out_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && entry.file_name() != DIFF_FILE_NAME)
        .map(walkdir::DirEntry::into_path)
        .collect()
}

#[async_trait]
impl BuildExecutor for CommandBuildExecutor {
    async fn execute(
        &self,
        job: &PackagingJob,
        plan: &PackagingPlan,
        progress: ProgressReporter,
    ) -> Result<BuildOutcome, BuildError> {
        let summary = plan.diff.summary();
        if self.skip_identical && plan.diff.classification == UpdateKind::Identical {
            tracing::info!("Skipping build of {}: {summary}", job.target);
            progress.report(100, "No changes since the installed version");
            return Ok(BuildOutcome {
                artifacts: Vec::new(),
                skipped: true,
                summary,
            });
        }

        let out_dir = self.job_output_dir(job);
        progress.report(5, "Preparing build");
        self.prepare(job, plan, &out_dir)?;

        progress.report(10, format!("Running {}", self.argv[0]));
        tracing::debug!("Running {:?} in {}", self.argv, job.payload.source_dir.display());
        let output = run_bounded(self.command(job, plan, &out_dir), self.timeout)
            .await
            .map_err(|failure| match failure {
                RunFailure::TimedOut => BuildError::TimedOut {
                    seconds: self.timeout.as_secs(),
                },
                RunFailure::Spawn(e) => BuildError::ConfigError {
                    message: format!("cannot run '{}': {e}", self.argv[0]),
                },
            })?;

        if !output.status.success() {
            return Err(BuildError::BuildFailed {
                target: job.target.key(),
                error: format!("{} exited with {}: {}", self.argv[0], output.status, tail(&output.stderr, 10)),
            });
        }

        let artifacts = collect_artifacts(&out_dir);
        progress.report(100, format!("Built {} artifacts", artifacts.len()));
        Ok(BuildOutcome {
            artifacts,
            skipped: false,
            summary,
        })
    }
}
