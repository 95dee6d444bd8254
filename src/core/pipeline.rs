//! Wiring of the two scheduling stages
//!
//! Builds one event bus, both job stores, the failure circuit, and the two
//! schedulers, and exposes the operations callers need. Packaging jobs are
//! released by the extraction stage through `extraction.completed` on the
//! shared bus.

use chrono::Utc;
use std::sync::Arc;

use crate::core::circuit::FailureCircuit;
use crate::core::events::{EventBus, SchedulerEvent, Subscription};
use crate::core::executor::{BuildExecutor, ExtractionExecutor};
use crate::core::extraction::ExtractionScheduler;
use crate::core::global_config::SchedulerConfig;
use crate::core::job::{
    ExtractionJob, ExtractionPayload, JobId, PackagingJob, PackagingPayload, SourceIdentity,
    TargetIdentity,
};
use crate::core::job_store::JobStore;
use crate::core::packaging::{PackagingDeps, PackagingScheduler};
use crate::core::planner::DiffPlanner;
use crate::error::JobStoreError;

/// Extraction and packaging schedulers sharing one bus
#[derive(Debug, Clone)]
pub struct Pipeline {
    bus: EventBus,
    circuit: Arc<FailureCircuit>,
    extraction: ExtractionScheduler,
    packaging: PackagingScheduler,
    config: SchedulerConfig,
}

impl Pipeline {
    pub fn new(
        config: SchedulerConfig,
        planner: DiffPlanner,
        extractor: Arc<dyn ExtractionExecutor>,
        builder: Arc<dyn BuildExecutor>,
    ) -> Self {
        let bus = EventBus::new();
        let circuit = Arc::new(FailureCircuit::new(config.circuit));
        let extraction = ExtractionScheduler::new(
            Arc::new(JobStore::new(bus.clone())),
            extractor,
            config.max_concurrent_extraction,
        );
        let packaging = PackagingScheduler::new(
            PackagingDeps {
                store: Arc::new(JobStore::new(bus.clone())),
                sources: extraction.clone(),
                circuit: Arc::clone(&circuit),
                planner,
                executor: builder,
                bus: bus.clone(),
            },
            config.max_concurrent_packaging,
        );

        tracing::debug!(
            "Pipeline ready: {} extraction slots, {} packaging slots",
            config.max_concurrent_extraction,
            config.max_concurrent_packaging
        );

        Self {
            bus,
            circuit,
            extraction,
            packaging,
            config,
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Subscribe to lifecycle events; see [`EventBus::subscribe`]
    pub fn subscribe<F>(&self, pattern: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&SchedulerEvent) + Send + Sync + 'static,
    {
        self.bus.subscribe(pattern, handler)
    }

    pub fn circuit(&self) -> &FailureCircuit {
        &self.circuit
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn extraction(&self) -> &ExtractionScheduler {
        &self.extraction
    }

    pub fn packaging(&self) -> &PackagingScheduler {
        &self.packaging
    }

    pub fn submit_extraction(
        &self,
        source: SourceIdentity,
        payload: ExtractionPayload,
    ) -> Result<JobId, JobStoreError> {
        self.extraction.submit(source, payload)
    }

    pub fn submit_packaging(
        &self,
        source: SourceIdentity,
        target: TargetIdentity,
        priority: i32,
        payload: PackagingPayload,
    ) -> Result<JobId, JobStoreError> {
        self.packaging.submit(source, target, priority, payload)
    }

    /// Cancel a packaging job; false if unknown or already finished
    pub fn cancel(&self, id: JobId) -> bool {
        self.packaging.cancel(id)
    }

    pub fn extraction_job(&self, id: JobId) -> Option<ExtractionJob> {
        self.extraction.store().get(id)
    }

    pub fn packaging_job(&self, id: JobId) -> Option<PackagingJob> {
        self.packaging.store().get(id)
    }

    /// Remove finished jobs older than the configured retention
    ///
    /// Returns the number of records removed from both stores.
    pub fn cleanup_finished(&self) -> usize {
        let retention =
            chrono::Duration::from_std(self.config.job_retention).unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(retention)
            .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);
        let removed =
            self.extraction.store().cleanup(cutoff) + self.packaging.store().cleanup(cutoff);
        if removed > 0 {
            tracing::debug!("Removed {removed} finished jobs");
        }
        removed
    }
}
