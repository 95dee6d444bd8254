//! Run command implementation
//!
//! Implements `bundlesmith run`: extracts one archive and builds installers
//! for one target through the full pipeline, following progress through
//! the event bus.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::cli::output::{self, status};
use crate::core::events::SchedulerEvent;
use crate::core::global_config::GlobalConfig;
use crate::core::job::{
    ExtractionPayload, PackagingPayload, PackagingState, SourceIdentity, TargetIdentity,
    TargetPlatform,
};
use crate::core::pipeline::Pipeline;
use crate::core::planner::DiffPlanner;
use crate::core::fingerprint::HashManifestBuilder;
use crate::infra::build_command::CommandBuildExecutor;
use crate::infra::dirs::BundlesmithDirs;
use crate::infra::extract::ArchiveExtractor;
use crate::infra::locator::{InstallRoots, InstallationLocator};

/// Options for one pipeline run
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub archive: PathBuf,
    pub session: String,
    pub target: TargetIdentity,
    pub app_version: String,
    pub priority: i32,
}

/// Execute the run command
pub async fn execute(options: RunOptions) -> Result<()> {
    let dirs = BundlesmithDirs::new();
    let config = GlobalConfig::load(&dirs).context("Failed to load configuration")?;

    let builder = CommandBuildExecutor::from_config(&config, &dirs)
        .context("Cannot build installers")?;
    let extractor = ArchiveExtractor::new(config.extraction_timeout());
    // Prior builds are looked up where this host installs them, whatever
    // platforms the installers are built for
    let planner = DiffPlanner::new(
        HashManifestBuilder::new(),
        InstallationLocator::new(InstallRoots::from_env(), TargetPlatform::current()),
    );

    let pipeline = Pipeline::new(
        config.scheduler_config(),
        planner,
        Arc::new(extractor),
        Arc::new(builder),
    );

    let (events_tx, mut events) = mpsc::unbounded_channel();
    let _subscription = pipeline.subscribe("*", move |event| {
        // Receiver gone means the command is already done
        let _ = events_tx.send(event.clone());
    });

    let source = SourceIdentity::new(&options.session);
    let destination = config.work_dir(&dirs).join(&options.session);
    let extraction_id = pipeline.submit_extraction(
        source.clone(),
        ExtractionPayload {
            archive: options.archive.clone(),
            destination: destination.clone(),
        },
    )?;

    // Directories are used in place, archives land in the work dir
    let source_dir = if options.archive.is_dir() {
        options.archive.clone()
    } else {
        destination
    };
    let packaging_id = pipeline.submit_packaging(
        source,
        options.target.clone(),
        options.priority,
        PackagingPayload {
            source_dir,
            app_version: options.app_version.clone(),
            options: serde_json::Value::Null,
        },
    )?;

    let spinner = output::create_spinner(&format!("Extracting {}", options.archive.display()));
    while let Some(event) = events.recv().await {
        match &event {
            SchedulerEvent::ExtractionFailed { job_id, error, .. } if *job_id == extraction_id => {
                spinner.finish_and_clear();
                pipeline.cancel(packaging_id);
                bail!("Extraction of {} failed: {error}", options.archive.display());
            }
            SchedulerEvent::ExtractionCompleted { job_id, .. } if *job_id == extraction_id => {
                spinner.set_message("Waiting for a build slot");
            }
            SchedulerEvent::PackagingStarted { job_id } if *job_id == packaging_id => {
                spinner.set_message(format!("Building {}", options.target));
            }
            SchedulerEvent::PackagingProgress {
                job_id,
                percent,
                message,
            } if *job_id == packaging_id => {
                spinner.set_message(format!("[{percent:>3}%] {message}"));
            }
            other if other.job_id() == packaging_id => {
                if let Some(job) = pipeline.packaging_job(packaging_id) {
                    if job.state.is_terminal() {
                        spinner.finish_and_clear();
                        break;
                    }
                }
            }
            _ => {}
        }
    }

    let job = pipeline
        .packaging_job(packaging_id)
        .context("Packaging job disappeared")?;

    if output::is_json() {
        output::print_json(&job)?;
    }

    match job.state {
        PackagingState::Completed => {
            let result = job.result.unwrap_or_default();
            if result.skipped {
                output::status_line(status::INFO, format!("{}: nothing to build ({})", job.target, result.summary));
            } else {
                output::status_line(
                    status::SUCCESS,
                    format!("{} {}: {}", job.target, job.payload.app_version, result.summary),
                );
                for artifact in &result.artifacts {
                    output::status_line(" ", artifact.display());
                }
            }
            Ok(())
        }
        state => bail!(
            "Packaging of {} ended {state:?}: {}",
            job.target,
            job.error.as_deref().unwrap_or("no error recorded")
        ),
    }
}
