//! Packaging scheduler
//!
//! Dispatches installer builds with bounded concurrency, smallest priority
//! value first and submission order among equals. A job waits until its
//! source has been extracted; one completed extraction can release many
//! jobs. Before a job starts, the target's failure circuit is consulted: an
//! open circuit fails the job without using a slot.
//!
//! Cancellation is cooperative. A cancelled in-flight build keeps its slot
//! until the executor returns, and its result is discarded.
//!
//! Dispatch spawns Tokio tasks, so submissions must happen inside a Tokio
//! runtime.

use futures::FutureExt;
use parking_lot::Mutex;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::core::circuit::FailureCircuit;
use crate::core::dispatch::DispatchGate;
use crate::core::events::{EventBus, SchedulerEvent, Subscription};
use crate::core::executor::{BuildExecutor, ProgressReporter};
use crate::core::extraction::ExtractionScheduler;
use crate::core::job::{
    BuildOutcome, JobId, PackagingJob, PackagingPayload, PackagingState, SourceIdentity,
    TargetIdentity,
};
use crate::core::job_store::JobStore;
use crate::core::planner::DiffPlanner;
use crate::error::{JobStoreError, SchedulerError};

/// States from which a job can still be cancelled
const CANCELLABLE: &[PackagingState] = &[
    PackagingState::WaitingForSource,
    PackagingState::Ready,
    PackagingState::Processing,
];

struct PackagingInner {
    store: Arc<JobStore<PackagingJob>>,
    sources: ExtractionScheduler,
    circuit: Arc<FailureCircuit>,
    planner: DiffPlanner,
    executor: Arc<dyn BuildExecutor>,
    bus: EventBus,
    gate: DispatchGate,
    max_concurrent: usize,
    sequence: AtomicU64,
    source_ready: Mutex<Option<Subscription>>,
}

impl Drop for PackagingInner {
    fn drop(&mut self) {
        if let Some(subscription) = self.source_ready.get_mut().take() {
            subscription.unsubscribe();
        }
    }
}

/// Bounded priority dispatcher for packaging jobs
#[derive(Clone)]
pub struct PackagingScheduler {
    inner: Arc<PackagingInner>,
}

impl std::fmt::Debug for PackagingScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackagingScheduler")
            .field("max_concurrent", &self.inner.max_concurrent)
            .field("in_flight", &self.inner.gate.in_flight())
            .finish()
    }
}

/// Collaborators of a [`PackagingScheduler`]
pub struct PackagingDeps {
    pub store: Arc<JobStore<PackagingJob>>,
    pub sources: ExtractionScheduler,
    pub circuit: Arc<FailureCircuit>,
    pub planner: DiffPlanner,
    pub executor: Arc<dyn BuildExecutor>,
    pub bus: EventBus,
}

impl PackagingScheduler {
    /// Create the scheduler and subscribe it to `extraction.completed`
    pub fn new(deps: PackagingDeps, max_concurrent: usize) -> Self {
        let inner = Arc::new(PackagingInner {
            store: deps.store,
            sources: deps.sources,
            circuit: deps.circuit,
            planner: deps.planner,
            executor: deps.executor,
            bus: deps.bus,
            gate: DispatchGate::new(),
            max_concurrent: max_concurrent.max(1),
            sequence: AtomicU64::new(0),
            source_ready: Mutex::new(None),
        });

        let weak: Weak<PackagingInner> = Arc::downgrade(&inner);
        let subscription = inner.bus.subscribe("extraction.completed", move |event| {
            let SchedulerEvent::ExtractionCompleted { source, .. } = event else {
                return;
            };
            if let Some(inner) = weak.upgrade() {
                PackagingScheduler { inner }.on_source_ready(source);
            }
        });
        *inner.source_ready.lock() = Some(subscription);

        Self { inner }
    }

    pub fn store(&self) -> &Arc<JobStore<PackagingJob>> {
        &self.inner.store
    }

    /// Queue a packaging job
    ///
    /// The job is Ready at once if its source is already extracted, else it
    /// waits for `extraction.completed` of that source.
    pub fn submit(
        &self,
        source: SourceIdentity,
        target: TargetIdentity,
        priority: i32,
        payload: PackagingPayload,
    ) -> Result<JobId, JobStoreError> {
        let sequence = self.inner.sequence.fetch_add(1, Ordering::SeqCst);
        let job = PackagingJob::new(source.clone(), target, priority, payload, sequence);
        let id = job.id;
        tracing::info!("Queued packaging {id} for {} (priority {priority})", job.target);
        self.inner.store.put(job)?;

        // Checked after the put: a completion racing with this submission
        // either is seen here or promotes the stored job through its event.
        if self.inner.sources.is_source_ready(&source) {
            self.on_source_ready(&source);
        }
        Ok(id)
    }

    /// Release every job waiting on `source` and dispatch
    pub fn on_source_ready(&self, source: &SourceIdentity) {
        let released = self.inner.store.transition_matching(
            |job| &job.source == source,
            PackagingState::WaitingForSource,
            PackagingState::Ready,
        );
        if !released.is_empty() {
            tracing::debug!("Source {source} released {} packaging jobs", released.len());
        }
        self.dispatch();
    }

    /// Cancel a job that has not finished yet
    ///
    /// Returns false if the job is unknown or already terminal.
    pub fn cancel(&self, id: JobId) -> bool {
        match self
            .inner
            .store
            .transition(id, CANCELLABLE, PackagingState::Cancelled)
        {
            Ok(job) => {
                tracing::info!("Cancelled packaging {id} for {}", job.target);
                true
            }
            Err(e) => {
                tracing::debug!("Cancel of {id} had no effect: {e}");
                false
            }
        }
    }

    /// External calls currently outstanding
    pub fn in_flight(&self) -> usize {
        self.inner.gate.in_flight()
    }

    /// Start ready jobs while slots are free
    pub fn dispatch(&self) {
        self.inner.gate.run(|| self.dispatch_pass());
    }

    fn dispatch_pass(&self) {
        let inner = &self.inner;
        while inner.gate.in_flight() < inner.max_concurrent {
            let circuit = &inner.circuit;
            let Some(job) = inner.store.transition_next(
                PackagingState::Ready,
                PackagingJob::dispatch_key,
                |job| {
                    let key = job.target.key();
                    if circuit.is_open(&key) {
                        job.error = Some(SchedulerError::CircuitOpen { target: key }.to_string());
                        PackagingState::Failed
                    } else {
                        PackagingState::Processing
                    }
                },
            ) else {
                break;
            };

            if job.state == PackagingState::Processing {
                inner.gate.acquire();
                tracing::info!("Packaging {} for {}", job.id, job.target);
                self.spawn(job);
            } else {
                tracing::warn!("Skipped packaging {} for {}: circuit open", job.id, job.target);
            }
        }
    }

    fn spawn(&self, job: PackagingJob) {
        let this = self.clone();
        tokio::spawn(async move {
            let result = AssertUnwindSafe(this.run(&job)).catch_unwind().await;
            let outcome = result.unwrap_or_else(|_| {
                Err(SchedulerError::ExecutorPanicked(
                    "build executor panicked".to_string(),
                ))
            });
            this.finish(&job, outcome);
        });
    }

    async fn run(&self, job: &PackagingJob) -> Result<BuildOutcome, SchedulerError> {
        let planner = self.inner.planner.clone();
        let source_dir = job.payload.source_dir.clone();
        let target = job.target.clone();
        let version = job.payload.app_version.clone();

        let plan = tokio::task::spawn_blocking(move || planner.plan(&source_dir, &target, &version))
            .await
            .map_err(|e| SchedulerError::PackagingFailure(e.to_string()))?
            .map_err(|e| SchedulerError::PackagingFailure(e.to_string()))?;

        if self.is_cancelled(job.id) {
            tracing::debug!("Packaging {} cancelled before build started", job.id);
            return Ok(BuildOutcome::default());
        }

        let progress = ProgressReporter::new(job.id, self.inner.bus.clone());
        self.inner
            .executor
            .execute(job, &plan, progress)
            .await
            .map_err(|e| SchedulerError::PackagingFailure(e.to_string()))
    }

    fn is_cancelled(&self, id: JobId) -> bool {
        self.inner
            .store
            .get(id)
            .is_some_and(|job| job.state == PackagingState::Cancelled)
    }

    fn finish(&self, job: &PackagingJob, outcome: Result<BuildOutcome, SchedulerError>) {
        let key = job.target.key();

        let transition = match outcome {
            Ok(result) => self
                .inner
                .store
                .transition_with(
                    job.id,
                    &[PackagingState::Processing],
                    PackagingState::Completed,
                    |record| record.result = Some(result),
                )
                .map(|_| {
                    tracing::info!("Packaging {} for {} completed", job.id, job.target);
                    self.inner.circuit.record_success(&key);
                }),
            Err(e) => self
                .inner
                .store
                .transition_with(
                    job.id,
                    &[PackagingState::Processing],
                    PackagingState::Failed,
                    |record| record.error = Some(e.to_string()),
                )
                .map(|_| {
                    tracing::warn!("Packaging {} for {} failed: {e}", job.id, job.target);
                    self.inner.circuit.record_failure(&key);
                }),
        };

        if let Err(e) = transition {
            if self.is_cancelled(job.id) {
                tracing::debug!("Discarding result of cancelled packaging {}", job.id);
            } else {
                tracing::error!("Packaging completion could not be recorded: {e}");
            }
        }

        // The record leaves Processing before its slot is handed back
        self.inner.gate.release();
        self.dispatch();
    }
}
