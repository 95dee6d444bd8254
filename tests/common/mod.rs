//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Semaphore;

use bundlesmith::core::events::{EventBus, SchedulerEvent};
use bundlesmith::core::executor::{
    BuildExecutor, ExtractionExecutor, ExtractionOutcome, ProgressReporter,
};
use bundlesmith::core::job::{BuildOutcome, ExtractionPayload, PackagingJob};
use bundlesmith::core::planner::PackagingPlan;
use bundlesmith::error::{BuildError, ExtractionError};

/// Test project context
///
/// Creates a temporary directory and provides utilities for setting up
/// source trees and install roots.
pub struct TestProject {
    /// Temporary directory for the test project
    pub dir: TempDir,
}

impl TestProject {
    /// Create a new test project in a temporary directory
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Get the path to the test project directory
    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Create a file in the test project
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(path, content).expect("Failed to write file");
    }

    /// Create a directory in the test project
    pub fn create_dir(&self, name: &str) {
        let path = self.dir.path().join(name);
        std::fs::create_dir_all(path).expect("Failed to create directory");
    }

    /// Remove a file from the test project
    pub fn remove_file(&self, name: &str) {
        std::fs::remove_file(self.dir.path().join(name)).expect("Failed to remove file");
    }

    /// Check if a file exists in the test project
    pub fn file_exists(&self, name: &str) -> bool {
        self.dir.path().join(name).exists()
    }

    /// Read a file from the test project
    pub fn read_file(&self, name: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(name)).expect("Failed to read file")
    }

    /// Write a small web-app bundle under `name`
    pub fn create_app(&self, name: &str) -> PathBuf {
        for (file, content) in SAMPLE_APP {
            self.create_file(&format!("{name}/{file}"), content);
        }
        self.dir.path().join(name)
    }

    /// Root that every install location is confined to
    pub fn install_root(&self) -> PathBuf {
        self.dir.path().join("install-root")
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Files of a minimal packaged web app
pub const SAMPLE_APP: &[(&str, &str)] = &[
    ("index.html", "<!doctype html><title>Notes</title>"),
    ("package.json", r#"{"name":"notes","version":"1.0.0"}"#),
    ("main.js", "require('electron')"),
    ("assets/app.css", "body { margin: 0 }"),
    ("assets/logo.png", "PNG"),
];

/// Run the bundlesmith binary with an isolated configuration
pub fn run_bundlesmith(project: &TestProject, args: &[&str]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_bundlesmith"));
    cmd.current_dir(project.path())
        .env("BUNDLESMITH_CONFIG_DIR", project.path().join("config"))
        .env("BUNDLESMITH_CACHE_DIR", project.path().join("cache"))
        .env("BUNDLESMITH_DATA_DIR", project.path().join("data"))
        .env("BUNDLESMITH_INSTALL_ROOT", project.install_root())
        .env_remove("RUST_LOG");
    for arg in args {
        cmd.arg(arg);
    }
    cmd.output().expect("Failed to execute bundlesmith")
}

/// Record of everything published on a bus
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<SchedulerEvent>>>,
}

impl EventLog {
    pub fn attach(bus: &EventBus) -> Self {
        let log = Self::default();
        let events = Arc::clone(&log.events);
        bus.subscribe("*", move |event| events.lock().push(event.clone()));
        log
    }

    pub fn topics(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(SchedulerEvent::topic).collect()
    }

    pub fn events(&self) -> Vec<SchedulerEvent> {
        self.events.lock().clone()
    }
}

/// Calls into a gated fake, in the order they started
#[derive(Clone, Default)]
pub struct CallLog {
    pub started: Arc<Mutex<Vec<String>>>,
    pub active: Arc<AtomicUsize>,
    pub peak: Arc<AtomicUsize>,
}

impl CallLog {
    fn enter(&self, label: String) {
        self.started.lock().push(label);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().clone()
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Extraction executor that completes only when the test releases a permit
///
/// Archives whose file name contains `corrupt` fail.
#[derive(Clone)]
pub struct GatedExtractor {
    pub gate: Arc<Semaphore>,
    pub calls: CallLog,
}

impl GatedExtractor {
    pub fn new() -> Self {
        Self {
            gate: Arc::new(Semaphore::new(0)),
            calls: CallLog::default(),
        }
    }

    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }
}

#[async_trait]
impl ExtractionExecutor for GatedExtractor {
    async fn extract(&self, payload: &ExtractionPayload) -> Result<ExtractionOutcome, ExtractionError> {
        let label = payload.archive.display().to_string();
        self.calls.enter(label);
        let permit = self.gate.acquire().await.expect("gate closed");
        permit.forget();
        self.calls.leave();
        if payload.archive.to_string_lossy().contains("corrupt") {
            return Err(ExtractionError::Archive {
                path: payload.archive.clone(),
                error: "unexpected end of archive".to_string(),
            });
        }
        Ok(ExtractionOutcome {
            root: payload.destination.clone(),
        })
    }
}

/// Build executor that completes only when the test releases a permit
///
/// Targets listed in `failing` return a build error.
#[derive(Clone)]
pub struct GatedBuilder {
    pub gate: Arc<Semaphore>,
    pub calls: CallLog,
    pub failing: Arc<Mutex<Vec<String>>>,
    pub plans: Arc<Mutex<HashMap<String, PackagingPlan>>>,
}

impl GatedBuilder {
    pub fn new() -> Self {
        Self {
            gate: Arc::new(Semaphore::new(0)),
            calls: CallLog::default(),
            failing: Arc::default(),
            plans: Arc::default(),
        }
    }

    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub fn fail_target(&self, key: &str) {
        self.failing.lock().push(key.to_string());
    }

    pub fn plan_for(&self, app_name: &str) -> Option<PackagingPlan> {
        self.plans.lock().get(app_name).cloned()
    }
}

#[async_trait]
impl BuildExecutor for GatedBuilder {
    async fn execute(
        &self,
        job: &PackagingJob,
        plan: &PackagingPlan,
        progress: ProgressReporter,
    ) -> Result<BuildOutcome, BuildError> {
        self.calls.enter(job.target.app_name.clone());
        self.plans.lock().insert(job.target.app_name.clone(), plan.clone());
        progress.report(50, "building");
        let permit = self.gate.acquire().await.expect("gate closed");
        permit.forget();
        self.calls.leave();

        let key = job.target.key();
        if self.failing.lock().contains(&key) {
            return Err(BuildError::BuildFailed {
                target: key,
                error: "installer tool crashed".to_string(),
            });
        }
        Ok(BuildOutcome {
            artifacts: vec![PathBuf::from(format!("{}.exe", job.target.app_name))],
            skipped: false,
            summary: plan.diff.summary(),
        })
    }
}

/// Poll `check` until it holds or a few seconds pass
pub async fn eventually<F>(what: &str, check: F)
where
    F: Fn() -> bool,
{
    for _ in 0..400 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Let spawned tasks run without waiting for a condition
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
}

pub fn path_str(path: &Path) -> &str {
    path.to_str().expect("non-UTF-8 test path")
}
