//! External collaborators
//!
//! The schedulers never unpack archives or run installer tooling
//! themselves. They call into these traits and suspend until the call
//! returns; a maximum-duration watchdog is the implementation's job and
//! must surface as an error.

use async_trait::async_trait;
use std::path::PathBuf;

use crate::core::events::{EventBus, SchedulerEvent};
use crate::core::job::{BuildOutcome, ExtractionPayload, JobId, PackagingJob};
use crate::core::planner::PackagingPlan;
use crate::error::{BuildError, ExtractionError};

/// Result of a successful extraction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionOutcome {
    /// Directory holding the unpacked source
    pub root: PathBuf,
}

/// Unpacks a source archive
#[async_trait]
pub trait ExtractionExecutor: Send + Sync {
    async fn extract(&self, payload: &ExtractionPayload) -> Result<ExtractionOutcome, ExtractionError>;
}

/// Builds installers for one packaging job
#[async_trait]
pub trait BuildExecutor: Send + Sync {
    async fn execute(
        &self,
        job: &PackagingJob,
        plan: &PackagingPlan,
        progress: ProgressReporter,
    ) -> Result<BuildOutcome, BuildError>;
}

/// Publishes `packaging.progress` events for one job
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    job_id: JobId,
    bus: EventBus,
}

impl ProgressReporter {
    pub fn new(job_id: JobId, bus: EventBus) -> Self {
        Self { job_id, bus }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Report progress; `percent` is clamped to 100
    pub fn report(&self, percent: u8, message: impl Into<String>) {
        self.bus.publish(&SchedulerEvent::PackagingProgress {
            job_id: self.job_id,
            percent: percent.min(100),
            message: message.into(),
        });
    }
}
