//! Extraction scheduler
//!
//! Unpacks source archives with bounded concurrency, strictly in submission
//! order. A completed extraction publishes `extraction.completed`, which is
//! what releases packaging jobs waiting on that source. Failures are
//! reported once and never retried here.
//!
//! Dispatch spawns Tokio tasks, so submissions must happen inside a Tokio
//! runtime.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::core::dispatch::DispatchGate;
use crate::core::executor::{ExtractionExecutor, ExtractionOutcome};
use crate::core::job::{ExtractionJob, ExtractionPayload, ExtractionState, JobId, SourceIdentity};
use crate::core::job_store::JobStore;
use crate::error::{ExtractionError, JobStoreError, SchedulerError};

struct ExtractionInner {
    store: Arc<JobStore<ExtractionJob>>,
    executor: Arc<dyn ExtractionExecutor>,
    gate: DispatchGate,
    max_concurrent: usize,
    sequence: AtomicU64,
}

/// Bounded FIFO dispatcher for extraction jobs
#[derive(Clone)]
pub struct ExtractionScheduler {
    inner: Arc<ExtractionInner>,
}

impl std::fmt::Debug for ExtractionScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionScheduler")
            .field("max_concurrent", &self.inner.max_concurrent)
            .field("in_flight", &self.inner.gate.in_flight())
            .finish()
    }
}

impl ExtractionScheduler {
    pub fn new(
        store: Arc<JobStore<ExtractionJob>>,
        executor: Arc<dyn ExtractionExecutor>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            inner: Arc::new(ExtractionInner {
                store,
                executor,
                gate: DispatchGate::new(),
                max_concurrent: max_concurrent.max(1),
                sequence: AtomicU64::new(0),
            }),
        }
    }

    pub fn store(&self) -> &Arc<JobStore<ExtractionJob>> {
        &self.inner.store
    }

    /// Queue an extraction and dispatch if a slot is free
    pub fn submit(
        &self,
        source: SourceIdentity,
        payload: ExtractionPayload,
    ) -> Result<JobId, JobStoreError> {
        let sequence = self.inner.sequence.fetch_add(1, Ordering::SeqCst);
        let job = ExtractionJob::new(source, payload, sequence);
        let id = job.id;
        tracing::info!("Queued extraction {id} for source {}", job.source);
        self.inner.store.put(job)?;
        self.dispatch();
        Ok(id)
    }

    /// Whether `source` has a completed extraction
    pub fn is_source_ready(&self, source: &SourceIdentity) -> bool {
        !self
            .inner
            .store
            .list_by(|job| job.state == ExtractionState::Completed && &job.source == source)
            .is_empty()
    }

    /// External calls currently outstanding
    pub fn in_flight(&self) -> usize {
        self.inner.gate.in_flight()
    }

    /// Start queued jobs while slots are free
    pub fn dispatch(&self) {
        self.inner.gate.run(|| self.dispatch_pass());
    }

    fn dispatch_pass(&self) {
        let inner = &self.inner;
        while inner.gate.in_flight() < inner.max_concurrent {
            let Some(job) = inner.store.transition_next(
                ExtractionState::Queued,
                |job| job.sequence,
                |_| ExtractionState::Processing,
            ) else {
                break;
            };
            inner.gate.acquire();
            tracing::info!("Extracting {} for source {}", job.payload.archive.display(), job.source);
            self.spawn(job);
        }
    }

    fn spawn(&self, job: ExtractionJob) {
        let this = self.clone();
        tokio::spawn(async move {
            let result = AssertUnwindSafe(this.inner.executor.extract(&job.payload))
                .catch_unwind()
                .await;
            this.finish(&job, result);
        });
    }

    fn finish(
        &self,
        job: &ExtractionJob,
        result: std::thread::Result<Result<ExtractionOutcome, ExtractionError>>,
    ) {
        let outcome = match result {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(e)) => Err(SchedulerError::ExtractionFailure(e.to_string())),
            Err(_) => Err(SchedulerError::ExecutorPanicked(
                "extraction executor panicked".to_string(),
            )),
        };

        let transition = match outcome {
            Ok(outcome) => {
                tracing::info!(
                    "Extraction {} finished into {}",
                    job.id,
                    outcome.root.display()
                );
                self.inner.store.transition(
                    job.id,
                    &[ExtractionState::Processing],
                    ExtractionState::Completed,
                )
            }
            Err(e) => {
                tracing::warn!("Extraction {} failed: {e}", job.id);
                self.inner.store.transition_with(
                    job.id,
                    &[ExtractionState::Processing],
                    ExtractionState::Failed,
                    |record| record.error = Some(e.to_string()),
                )
            }
        };
        if let Err(e) = transition {
            tracing::error!("Extraction completion could not be recorded: {e}");
        }

        // The record leaves Processing before its slot is handed back
        self.inner.gate.release();
        self.dispatch();
    }
}
