//! Integration tests for the two-stage scheduler
//!
//! External calls are gated fakes, so each test decides when extractions
//! and builds complete.

mod common;

use async_trait::async_trait;
use common::{eventually, settle, EventLog, GatedBuilder, GatedExtractor, TestProject};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bundlesmith::core::circuit::CircuitConfig;
use bundlesmith::core::diff::UpdateKind;
use bundlesmith::core::executor::{
    BuildExecutor, ExtractionExecutor, ExtractionOutcome, ProgressReporter,
};
use bundlesmith::core::fingerprint::HashManifestBuilder;
use bundlesmith::core::global_config::SchedulerConfig;
use bundlesmith::core::job::{
    BuildOutcome, ExtractionPayload, ExtractionState, JobId, PackagingJob, PackagingPayload,
    PackagingState, SourceIdentity, TargetIdentity, TargetPlatform,
};
use bundlesmith::core::pipeline::Pipeline;
use bundlesmith::core::planner::{DiffPlanner, PackagingPlan};
use bundlesmith::error::{BuildError, ExtractionError};
use bundlesmith::infra::locator::{manifest_path, InstallRoots, InstallationLocator};

fn config(extraction: usize, packaging: usize) -> SchedulerConfig {
    SchedulerConfig {
        max_concurrent_extraction: extraction,
        max_concurrent_packaging: packaging,
        job_retention: Duration::from_secs(3600),
        circuit: CircuitConfig::default(),
    }
}

fn planner(project: &TestProject) -> DiffPlanner {
    DiffPlanner::new(
        HashManifestBuilder::new().with_platform("linux"),
        InstallationLocator::new(InstallRoots::under(&project.install_root()), TargetPlatform::Linux),
    )
}

struct Harness {
    project: TestProject,
    app_dir: PathBuf,
    pipeline: Pipeline,
    extractor: GatedExtractor,
    builder: GatedBuilder,
    log: EventLog,
}

impl Harness {
    fn new(config: SchedulerConfig) -> Self {
        let project = TestProject::new();
        let app_dir = project.create_app("app");
        let extractor = GatedExtractor::new();
        let builder = GatedBuilder::new();
        let pipeline = Pipeline::new(
            config,
            planner(&project),
            Arc::new(extractor.clone()),
            Arc::new(builder.clone()),
        );
        let log = EventLog::attach(pipeline.bus());
        Self {
            project,
            app_dir,
            pipeline,
            extractor,
            builder,
            log,
        }
    }

    fn extract(&self, session: &str) -> JobId {
        self.pipeline
            .submit_extraction(
                SourceIdentity::new(session),
                ExtractionPayload {
                    archive: self.project.path().join(format!("{session}.zip")),
                    destination: self.app_dir.clone(),
                },
            )
            .unwrap()
    }

    fn package(&self, session: &str, app: &str, priority: i32) -> JobId {
        self.pipeline
            .submit_packaging(
                SourceIdentity::new(session),
                TargetIdentity::new(app).with_platform(TargetPlatform::Linux),
                priority,
                self.payload("1.0.0"),
            )
            .unwrap()
    }

    fn payload(&self, version: &str) -> PackagingPayload {
        PackagingPayload {
            source_dir: self.app_dir.clone(),
            app_version: version.to_string(),
            options: serde_json::Value::Null,
        }
    }

    fn packaging_state(&self, id: JobId) -> PackagingState {
        self.pipeline.packaging_job(id).unwrap().state
    }

    fn extraction_state(&self, id: JobId) -> ExtractionState {
        self.pipeline.extraction_job(id).unwrap().state
    }
}

#[tokio::test]
async fn test_extraction_respects_concurrency_and_fifo_order() {
    let h = Harness::new(config(2, 1));
    let ids: Vec<JobId> = (0..5).map(|i| h.extract(&format!("s{i}"))).collect();

    eventually("two extractions started", || h.extractor.calls.started().len() == 2).await;
    settle().await;
    assert_eq!(h.extractor.calls.started().len(), 2);
    assert_eq!(h.pipeline.extraction().in_flight(), 2);
    assert_eq!(h.extraction_state(ids[4]), ExtractionState::Queued);

    h.extractor.release(1);
    eventually("third extraction started", || h.extractor.calls.started().len() == 3).await;

    h.extractor.release(4);
    for id in &ids {
        eventually("extraction completed", || h.extraction_state(*id) == ExtractionState::Completed).await;
    }

    assert!(h.extractor.calls.peak() <= 2);
    let started = h.extractor.calls.started();
    let expected: Vec<String> = (0..5)
        .map(|i| h.project.path().join(format!("s{i}.zip")).display().to_string())
        .collect();
    assert_eq!(started, expected);
    assert_eq!(h.pipeline.extraction().in_flight(), 0);
}

#[tokio::test]
async fn test_packaging_waits_for_its_source() {
    let h = Harness::new(config(1, 2));
    let job = h.package("s1", "Notes", 0);
    settle().await;
    assert_eq!(h.packaging_state(job), PackagingState::WaitingForSource);

    // A different source completing does not release the job
    h.extract("other");
    h.extractor.release(1);
    eventually("other source extracted", || h.pipeline.extraction().is_source_ready(&SourceIdentity::new("other"))).await;
    settle().await;
    assert_eq!(h.packaging_state(job), PackagingState::WaitingForSource);

    h.extract("s1");
    h.extractor.release(1);
    eventually("packaging started", || h.packaging_state(job) == PackagingState::Processing).await;

    h.builder.release(1);
    eventually("packaging completed", || h.packaging_state(job) == PackagingState::Completed).await;
}

#[tokio::test]
async fn test_submission_after_extraction_is_ready_at_once() {
    let h = Harness::new(config(1, 1));
    let extraction = h.extract("s1");
    h.extractor.release(1);
    eventually("extraction completed", || h.extraction_state(extraction) == ExtractionState::Completed).await;

    let job = h.package("s1", "Notes", 0);
    eventually("packaging started", || h.packaging_state(job) == PackagingState::Processing).await;
    h.builder.release(1);
    eventually("packaging completed", || h.packaging_state(job) == PackagingState::Completed).await;
}

#[tokio::test]
async fn test_ready_jobs_dispatch_by_priority_then_submission() {
    let h = Harness::new(config(1, 1));
    let jobs = [
        h.package("s1", "first-5", 5),
        h.package("s1", "second-1", 1),
        h.package("s1", "third-5", 5),
        h.package("s1", "fourth-3", 3),
    ];

    h.extract("s1");
    h.extractor.release(1);
    eventually("first build started", || h.builder.calls.started().len() == 1).await;

    h.builder.release(4);
    for id in jobs {
        eventually("build completed", || h.packaging_state(id) == PackagingState::Completed).await;
    }

    assert_eq!(
        h.builder.calls.started(),
        vec!["second-1", "fourth-3", "first-5", "third-5"]
    );
    assert_eq!(h.builder.calls.peak(), 1);
}

#[tokio::test]
async fn test_one_source_releases_many_jobs_within_limit() {
    let h = Harness::new(config(1, 2));
    let jobs: Vec<JobId> = (0..4).map(|i| h.package("s1", &format!("app{i}"), 0)).collect();

    h.extract("s1");
    h.extractor.release(1);
    eventually("two builds started", || h.builder.calls.started().len() == 2).await;
    settle().await;
    assert_eq!(h.pipeline.packaging().in_flight(), 2);
    let ready = jobs.iter().filter(|id| h.packaging_state(**id) == PackagingState::Ready).count();
    assert_eq!(ready, 2);

    h.builder.release(4);
    for id in jobs {
        eventually("build completed", || h.packaging_state(id) == PackagingState::Completed).await;
    }
    assert!(h.builder.calls.peak() <= 2);
}

#[tokio::test]
async fn test_cancelled_waiting_job_is_never_dispatched() {
    let h = Harness::new(config(1, 1));
    let cancelled = h.package("s1", "Cancelled", 0);
    let kept = h.package("s1", "Kept", 1);

    assert!(h.pipeline.cancel(cancelled));
    assert!(!h.pipeline.cancel(cancelled));
    assert_eq!(h.packaging_state(cancelled), PackagingState::Cancelled);

    h.extract("s1");
    h.extractor.release(1);
    eventually("kept job started", || h.packaging_state(kept) == PackagingState::Processing).await;
    h.builder.release(1);
    eventually("kept job completed", || h.packaging_state(kept) == PackagingState::Completed).await;

    assert_eq!(h.packaging_state(cancelled), PackagingState::Cancelled);
    assert_eq!(h.builder.calls.started(), vec!["Kept"]);
    assert!(h.log.topics().contains(&"packaging.cancelled"));
}

#[tokio::test]
async fn test_cancelled_processing_job_discards_result() {
    let h = Harness::new(config(1, 1));
    h.builder.fail_target("Notes");
    let job = h.package("s1", "Notes", 0);
    let next = h.package("s1", "Next", 1);
    h.extract("s1");
    h.extractor.release(1);
    eventually("executor entered", || h.builder.calls.started().len() == 1).await;

    assert!(h.pipeline.cancel(job));
    settle().await;
    // Slot stays taken until the executor returns
    assert_eq!(h.pipeline.packaging().in_flight(), 1);
    assert_eq!(h.packaging_state(next), PackagingState::Ready);

    h.builder.release(1);
    eventually("next job started", || h.packaging_state(next) == PackagingState::Processing).await;
    let record = h.pipeline.packaging_job(job).unwrap();
    assert_eq!(record.state, PackagingState::Cancelled);
    assert!(record.error.is_none());
    assert_eq!(h.pipeline.circuit().failure_count("Notes"), 0);

    h.builder.release(1);
    eventually("next job completed", || h.packaging_state(next) == PackagingState::Completed).await;
}

#[tokio::test]
async fn test_failing_target_opens_circuit() {
    let mut cfg = config(1, 1);
    cfg.circuit.threshold = 2;
    let h = Harness::new(cfg);
    h.builder.fail_target("acme/Broken");

    let extraction = h.extract("s1");
    h.extractor.release(1);
    eventually("source extracted", || h.extraction_state(extraction) == ExtractionState::Completed).await;

    let target = TargetIdentity::new("Broken").with_organization_id("acme");
    let submit = || {
        h.pipeline
            .submit_packaging(SourceIdentity::new("s1"), target.clone(), 0, h.payload("1.0.0"))
            .unwrap()
    };

    h.builder.release(2);
    for _ in 0..2 {
        let id = submit();
        eventually("build failed", || h.packaging_state(id) == PackagingState::Failed).await;
        let job = h.pipeline.packaging_job(id).unwrap();
        assert!(job.error.unwrap().contains("installer tool crashed"));
    }
    assert!(h.pipeline.circuit().is_open("acme/Broken"));

    let skipped = submit();
    let job = h.pipeline.packaging_job(skipped).unwrap();
    assert_eq!(job.state, PackagingState::Failed);
    assert!(job.error.unwrap().contains("acme/Broken"));
    assert_eq!(h.builder.calls.started().len(), 2);
    assert_eq!(h.pipeline.packaging().in_flight(), 0);

    // Other targets are unaffected
    let healthy = h.package("s1", "Healthy", 0);
    h.builder.release(1);
    eventually("healthy build completed", || h.packaging_state(healthy) == PackagingState::Completed).await;
}

#[tokio::test]
async fn test_failed_extraction_leaves_packaging_waiting() {
    let h = Harness::new(config(1, 1));
    let job = h.package("corrupt", "Notes", 0);
    let extraction = h.extract("corrupt");
    h.extractor.release(1);

    eventually("extraction failed", || h.extraction_state(extraction) == ExtractionState::Failed).await;
    let record = h.pipeline.extraction_job(extraction).unwrap();
    assert!(record.error.unwrap().contains("unexpected end of archive"));
    assert!(!h.pipeline.extraction().is_source_ready(&SourceIdentity::new("corrupt")));

    settle().await;
    assert_eq!(h.packaging_state(job), PackagingState::WaitingForSource);
    assert!(h.log.topics().contains(&"extraction.failed"));
}

#[tokio::test]
async fn test_incremental_plan_against_installed_build() {
    let h = Harness::new(config(1, 1));

    // Previous build installed under /opt/Notes with its manifest
    let installed = h.project.install_root().join("opt").join("Notes");
    let previous = HashManifestBuilder::new()
        .with_platform("linux")
        .build(&h.app_dir, "Notes", "1.0.0")
        .unwrap();
    previous.save(&manifest_path(&installed)).unwrap();

    h.project.create_file("app/main.js", "require('electron'); start()");
    h.project.create_file("app/assets/new.svg", "<svg/>");
    h.project.remove_file("app/assets/logo.png");

    let job = h
        .pipeline
        .submit_packaging(
            SourceIdentity::new("s1"),
            TargetIdentity::new("Notes").with_platform(TargetPlatform::Linux),
            0,
            h.payload("1.1.0"),
        )
        .unwrap();
    h.extract("s1");
    h.extractor.release(1);
    h.builder.release(1);
    eventually("build completed", || h.packaging_state(job) == PackagingState::Completed).await;

    let plan = h.builder.plan_for("Notes").unwrap();
    assert_eq!(plan.prior_install.as_deref(), Some(installed.as_path()));
    assert_eq!(plan.diff.classification, UpdateKind::Incremental);
    assert_eq!(plan.diff.prior_version.as_deref(), Some("1.0.0"));
    assert!(plan.diff.changed.contains("main.js"));
    assert!(plan.diff.added.contains("assets/new.svg"));
    assert!(plan.diff.deleted.contains("assets/logo.png"));
    assert!(plan.diff.unchanged.contains("index.html"));

    let result = h.pipeline.packaging_job(job).unwrap().result.unwrap();
    assert_eq!(result.artifacts, vec![PathBuf::from("Notes.exe")]);
}

#[tokio::test]
async fn test_lifecycle_events_in_order() {
    let h = Harness::new(config(1, 1));
    let job = h.package("s1", "Notes", 0);
    h.extract("s1");
    h.extractor.release(1);
    h.builder.release(1);
    eventually("build completed", || h.packaging_state(job) == PackagingState::Completed).await;

    let topics: Vec<&str> = h
        .log
        .events()
        .iter()
        .filter(|event| event.job_id() == job)
        .map(|event| event.topic())
        .collect();
    assert_eq!(
        topics,
        vec![
            "packaging.queued",
            "packaging.ready",
            "packaging.started",
            "packaging.progress",
            "packaging.completed"
        ]
    );

    let all = h.log.topics();
    let extracted = all.iter().position(|t| *t == "extraction.completed").unwrap();
    let ready = all.iter().position(|t| *t == "packaging.ready").unwrap();
    assert!(extracted < ready);
}

struct PanickingBuilder;

#[async_trait]
impl BuildExecutor for PanickingBuilder {
    async fn execute(
        &self,
        job: &PackagingJob,
        _plan: &PackagingPlan,
        _progress: ProgressReporter,
    ) -> Result<BuildOutcome, BuildError> {
        if job.target.app_name == "Explodes" {
            panic!("installer tool bug");
        }
        Ok(BuildOutcome::default())
    }
}

#[tokio::test]
async fn test_executor_panic_fails_only_that_job() {
    let project = TestProject::new();
    let app_dir = project.create_app("app");
    let extractor = GatedExtractor::new();
    let pipeline = Pipeline::new(
        config(1, 1),
        planner(&project),
        Arc::new(extractor.clone()),
        Arc::new(PanickingBuilder),
    );
    let payload = PackagingPayload {
        source_dir: app_dir.clone(),
        app_version: "1.0.0".to_string(),
        options: serde_json::Value::Null,
    };

    let source = SourceIdentity::new("s1");
    let boom = pipeline
        .submit_packaging(source.clone(), TargetIdentity::new("Explodes"), 0, payload.clone())
        .unwrap();
    let fine = pipeline
        .submit_packaging(source.clone(), TargetIdentity::new("Fine"), 1, payload)
        .unwrap();
    pipeline
        .submit_extraction(
            source,
            ExtractionPayload {
                archive: project.path().join("s1.zip"),
                destination: app_dir,
            },
        )
        .unwrap();
    extractor.release(1);

    let state = |id| pipeline.packaging_job(id).unwrap().state;
    eventually("fine job completed", || state(fine) == PackagingState::Completed).await;
    let exploded = pipeline.packaging_job(boom).unwrap();
    assert_eq!(exploded.state, PackagingState::Failed);
    assert!(exploded.error.unwrap().contains("panicked"));
    assert_eq!(pipeline.packaging().in_flight(), 0);
}

#[tokio::test]
async fn test_cleanup_removes_only_finished_jobs() {
    let mut cfg = config(1, 1);
    cfg.job_retention = Duration::ZERO;
    let h = Harness::new(cfg);

    let done = h.package("s1", "Done", 0);
    let waiting = h.package("s2", "Waiting", 0);
    let extraction = h.extract("s1");
    h.extractor.release(1);
    h.builder.release(1);
    eventually("build completed", || h.packaging_state(done) == PackagingState::Completed).await;
    tokio::time::sleep(Duration::from_millis(5)).await;

    assert_eq!(h.pipeline.cleanup_finished(), 2);
    assert!(h.pipeline.packaging_job(done).is_none());
    assert!(h.pipeline.extraction_job(extraction).is_none());
    assert_eq!(h.packaging_state(waiting), PackagingState::WaitingForSource);
}

struct InstantExtractor;

#[async_trait]
impl ExtractionExecutor for InstantExtractor {
    async fn extract(&self, payload: &ExtractionPayload) -> Result<ExtractionOutcome, ExtractionError> {
        tokio::task::yield_now().await;
        Ok(ExtractionOutcome {
            root: payload.destination.clone(),
        })
    }
}

struct InstantBuilder;

#[async_trait]
impl BuildExecutor for InstantBuilder {
    async fn execute(
        &self,
        _job: &PackagingJob,
        _plan: &PackagingPlan,
        _progress: ProgressReporter,
    ) -> Result<BuildOutcome, BuildError> {
        tokio::task::yield_now().await;
        Ok(BuildOutcome::default())
    }
}

const BURST_TASKS: usize = 4;
const BURST_JOBS: usize = 150;

fn instant_pipeline(project: &TestProject, config: SchedulerConfig) -> Pipeline {
    Pipeline::new(
        config,
        planner(project),
        Arc::new(InstantExtractor),
        Arc::new(InstantBuilder),
    )
}

/// Poll on a real clock; bursts on a shared runtime take longer than [`eventually`]
async fn wait_for<F>(what: &str, check: F)
where
    F: Fn() -> bool,
{
    let deadline = std::time::Instant::now() + Duration::from_secs(60);
    while !check() {
        assert!(std::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_processing_records_never_exceed_packaging_limit() {
    const LIMIT: usize = 2;
    let project = TestProject::new();
    let app_dir = project.create_app("app");
    let pipeline = instant_pipeline(&project, config(1, LIMIT));

    let peak = Arc::new(AtomicUsize::new(0));
    {
        let store = Arc::clone(pipeline.packaging().store());
        let peak = Arc::clone(&peak);
        pipeline.subscribe("packaging.started", move |_| {
            let processing = store.count_in(PackagingState::Processing);
            peak.fetch_max(processing, Ordering::SeqCst);
        });
    }

    let source = SourceIdentity::new("burst");
    let extraction = pipeline
        .submit_extraction(
            source.clone(),
            ExtractionPayload {
                archive: project.path().join("burst.zip"),
                destination: app_dir.clone(),
            },
        )
        .unwrap();
    wait_for("source extracted", || {
        pipeline.extraction_job(extraction).unwrap().state == ExtractionState::Completed
    })
    .await;

    let payload = PackagingPayload {
        source_dir: app_dir,
        app_version: "1.0.0".to_string(),
        options: serde_json::Value::Null,
    };
    let submitters: Vec<_> = (0..BURST_TASKS)
        .map(|task| {
            let pipeline = pipeline.clone();
            let source = source.clone();
            let payload = payload.clone();
            tokio::spawn(async move {
                for i in 0..BURST_JOBS {
                    let target = TargetIdentity::new(format!("App{task}-{i}"));
                    pipeline
                        .submit_packaging(source.clone(), target, 0, payload.clone())
                        .unwrap();
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();
    for submitter in submitters {
        submitter.await.unwrap();
    }

    let store = Arc::clone(pipeline.packaging().store());
    wait_for("burst completed", || {
        store.count_in(PackagingState::Completed) == BURST_TASKS * BURST_JOBS
    })
    .await;

    let observed = peak.load(Ordering::SeqCst);
    assert!(observed >= 1);
    assert!(observed <= LIMIT, "{observed} records in Processing with limit {LIMIT}");
    wait_for("slots returned", || pipeline.packaging().in_flight() == 0).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_processing_records_never_exceed_extraction_limit() {
    const LIMIT: usize = 1;
    let project = TestProject::new();
    let app_dir = project.create_app("app");
    let pipeline = instant_pipeline(&project, config(LIMIT, 1));

    let peak = Arc::new(AtomicUsize::new(0));
    {
        let store = Arc::clone(pipeline.extraction().store());
        let peak = Arc::clone(&peak);
        pipeline.subscribe("extraction.started", move |_| {
            let processing = store.count_in(ExtractionState::Processing);
            peak.fetch_max(processing, Ordering::SeqCst);
        });
    }

    let submitters: Vec<_> = (0..BURST_TASKS)
        .map(|task| {
            let pipeline = pipeline.clone();
            let destination = app_dir.clone();
            let archives = project.path();
            tokio::spawn(async move {
                for i in 0..BURST_JOBS {
                    let session = format!("s{task}-{i}");
                    pipeline
                        .submit_extraction(
                            SourceIdentity::new(session.clone()),
                            ExtractionPayload {
                                archive: archives.join(format!("{session}.zip")),
                                destination: destination.clone(),
                            },
                        )
                        .unwrap();
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();
    for submitter in submitters {
        submitter.await.unwrap();
    }

    let store = Arc::clone(pipeline.extraction().store());
    wait_for("burst extracted", || {
        store.count_in(ExtractionState::Completed) == BURST_TASKS * BURST_JOBS
    })
    .await;

    let observed = peak.load(Ordering::SeqCst);
    assert!(observed >= 1);
    assert!(observed <= LIMIT, "{observed} records in Processing with limit {LIMIT}");
    wait_for("slots returned", || pipeline.extraction().in_flight() == 0).await;
}
