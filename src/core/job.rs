//! Job records and identities
//!
//! Extraction jobs unpack a source archive for a session; packaging jobs
//! build installers for a named target from that session's source tree.
//! Records are owned by a [`JobStore`](crate::core::job_store::JobStore) and
//! only change state through it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::core::events::SchedulerEvent;

/// Unique job identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Generate a fresh random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identity of an uploaded source (one extraction session)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceIdentity(String);

impl SourceIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Installer platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetPlatform {
    Windows,
    Macos,
    Linux,
}

impl TargetPlatform {
    /// Platform of the running process
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::Macos
        } else {
            Self::Linux
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::Macos => "macos",
            Self::Linux => "linux",
        }
    }
}

impl fmt::Display for TargetPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TargetPlatform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "windows" | "win" | "win32" => Ok(Self::Windows),
            "macos" | "mac" | "darwin" => Ok(Self::Macos),
            "linux" => Ok(Self::Linux),
            other => Err(format!("unknown platform '{other}'")),
        }
    }
}

/// Logical identity of a build output
///
/// The app name plus owning organization locates the prior manifest and keys
/// the failure circuit. The platform set only describes what to build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetIdentity {
    pub app_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_name: Option<String>,
    #[serde(default)]
    pub platforms: BTreeSet<TargetPlatform>,
}

impl TargetIdentity {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            organization_id: None,
            organization_name: None,
            platforms: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_organization_id(mut self, id: impl Into<String>) -> Self {
        self.organization_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_organization_name(mut self, name: impl Into<String>) -> Self {
        self.organization_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_platform(mut self, platform: TargetPlatform) -> Self {
        self.platforms.insert(platform);
        self
    }

    /// Organization path segment: the id wins over the name (shorter paths)
    pub fn organization_segment(&self) -> Option<&str> {
        let non_empty = |s: &&str| !s.is_empty();
        self.organization_id
            .as_deref()
            .filter(non_empty)
            .or_else(|| self.organization_name.as_deref().filter(non_empty))
    }

    /// Key used by the failure circuit
    pub fn key(&self) -> String {
        match self.organization_segment() {
            Some(org) => format!("{org}/{}", self.app_name),
            None => self.app_name.clone(),
        }
    }
}

impl fmt::Display for TargetIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Extraction job state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExtractionState {
    Queued,
    Processing,
    Completed,
    Failed,
}

/// Packaging job state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PackagingState {
    WaitingForSource,
    Ready,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl ExtractionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl PackagingState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// What to extract and where
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionPayload {
    /// Source archive (zip or tarball)
    pub archive: PathBuf,
    /// Directory the archive is unpacked into
    pub destination: PathBuf,
}

/// What to package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagingPayload {
    /// Extracted web-app bundle
    pub source_dir: PathBuf,
    /// Version stamped into the manifest
    pub app_version: String,
    /// Opaque executor options
    #[serde(default)]
    pub options: serde_json::Value,
}

/// Extraction job record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionJob {
    pub id: JobId,
    pub source: SourceIdentity,
    pub payload: ExtractionPayload,
    pub state: ExtractionState,
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl ExtractionJob {
    pub fn new(source: SourceIdentity, payload: ExtractionPayload, sequence: u64) -> Self {
        Self {
            id: JobId::new(),
            source,
            payload,
            state: ExtractionState::Queued,
            sequence,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
        }
    }
}

/// Result of a successful build, as reported by the executor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOutcome {
    /// Produced installer files
    #[serde(default)]
    pub artifacts: Vec<PathBuf>,
    /// Executor was asked to build but found nothing to do
    #[serde(default)]
    pub skipped: bool,
    /// Free-form description for display
    #[serde(default)]
    pub summary: String,
}

/// Packaging job record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackagingJob {
    pub id: JobId,
    pub source: SourceIdentity,
    pub target: TargetIdentity,
    /// Lower value is dispatched first
    pub priority: i32,
    pub payload: PackagingPayload,
    pub state: PackagingState,
    /// Submission order, used to break priority ties
    pub sequence: u64,
    pub queued_at: DateTime<Utc>,
    pub ready_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<BuildOutcome>,
    pub error: Option<String>,
}

impl PackagingJob {
    pub fn new(
        source: SourceIdentity,
        target: TargetIdentity,
        priority: i32,
        payload: PackagingPayload,
        sequence: u64,
    ) -> Self {
        Self {
            id: JobId::new(),
            source,
            target,
            priority,
            payload,
            state: PackagingState::WaitingForSource,
            sequence,
            queued_at: Utc::now(),
            ready_at: None,
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        }
    }

    /// Dispatch order key: priority first, then submission order
    pub fn dispatch_key(&self) -> (i32, u64) {
        (self.priority, self.sequence)
    }
}

/// A record the job store can hold
pub trait JobRecord: Clone + Send + Sync + 'static {
    type State: Copy + Eq + fmt::Debug + Send + Sync;

    fn id(&self) -> JobId;
    fn state(&self) -> Self::State;

    /// Move to `state`, stamping lifecycle timestamps
    fn set_state(&mut self, state: Self::State, at: DateTime<Utc>);

    /// Completion time, once terminal
    fn finished_at(&self) -> Option<DateTime<Utc>>;

    /// Event describing submission, if any
    fn submitted_event(&self) -> Option<SchedulerEvent>;

    /// Event describing the state the record just entered, if any
    fn state_event(&self) -> Option<SchedulerEvent>;
}

impl JobRecord for ExtractionJob {
    type State = ExtractionState;

    fn id(&self) -> JobId {
        self.id
    }

    fn state(&self) -> ExtractionState {
        self.state
    }

    fn set_state(&mut self, state: ExtractionState, at: DateTime<Utc>) {
        match state {
            ExtractionState::Processing => self.started_at = Some(at),
            ExtractionState::Completed | ExtractionState::Failed => self.completed_at = Some(at),
            ExtractionState::Queued => {}
        }
        self.state = state;
    }

    fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.state.is_terminal().then_some(self.completed_at).flatten()
    }

    fn submitted_event(&self) -> Option<SchedulerEvent> {
        None
    }

    fn state_event(&self) -> Option<SchedulerEvent> {
        match self.state {
            ExtractionState::Queued => None,
            ExtractionState::Processing => Some(SchedulerEvent::ExtractionStarted {
                job_id: self.id,
                source: self.source.clone(),
            }),
            ExtractionState::Completed => Some(SchedulerEvent::ExtractionCompleted {
                job_id: self.id,
                source: self.source.clone(),
            }),
            ExtractionState::Failed => Some(SchedulerEvent::ExtractionFailed {
                job_id: self.id,
                source: self.source.clone(),
                error: self.error.clone().unwrap_or_default(),
            }),
        }
    }
}

impl JobRecord for PackagingJob {
    type State = PackagingState;

    fn id(&self) -> JobId {
        self.id
    }

    fn state(&self) -> PackagingState {
        self.state
    }

    fn set_state(&mut self, state: PackagingState, at: DateTime<Utc>) {
        match state {
            PackagingState::Ready => self.ready_at = Some(at),
            PackagingState::Processing => self.started_at = Some(at),
            PackagingState::Completed | PackagingState::Failed | PackagingState::Cancelled => {
                self.completed_at = Some(at);
            }
            PackagingState::WaitingForSource => {}
        }
        self.state = state;
    }

    fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.state.is_terminal().then_some(self.completed_at).flatten()
    }

    fn submitted_event(&self) -> Option<SchedulerEvent> {
        Some(SchedulerEvent::PackagingQueued {
            job_id: self.id,
            target: self.target.clone(),
            priority: self.priority,
        })
    }

    fn state_event(&self) -> Option<SchedulerEvent> {
        match self.state {
            PackagingState::WaitingForSource => None,
            PackagingState::Ready => Some(SchedulerEvent::PackagingReady { job_id: self.id }),
            PackagingState::Processing => {
                Some(SchedulerEvent::PackagingStarted { job_id: self.id })
            }
            PackagingState::Completed => Some(SchedulerEvent::PackagingCompleted {
                job_id: self.id,
                result: self.result.clone().unwrap_or_default(),
            }),
            PackagingState::Failed => Some(SchedulerEvent::PackagingFailed {
                job_id: self.id,
                error: self.error.clone().unwrap_or_default(),
            }),
            PackagingState::Cancelled => {
                Some(SchedulerEvent::PackagingCancelled { job_id: self.id })
            }
        }
    }
}
